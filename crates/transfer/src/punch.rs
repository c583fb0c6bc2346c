//! Client side of the puncher exchange.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{debug, info};

use transhift_protocol::{CURRENT, ClientType, Message, Packet, Uid};
use transhift_session::{Role, Session, SessionError, State};

use crate::TransferError;
use crate::net::{connect_reusable, resolve, secure_connect};
use crate::types::TransferConfig;

/// A downloader registered with the puncher, waiting for an uploader.
pub struct PendingDownload {
    session: Session,
    uid: Uid,
    local_addr: SocketAddr,
}

impl PendingDownload {
    /// UID to hand to the uploader.
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Local address of the puncher connection; the peer listener reuses it.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits until the puncher introduces an uploader and returns its
    /// address. Keepalive pings are answered meanwhile.
    pub async fn wait_for_uploader(mut self) -> Result<SocketAddr, TransferError> {
        let msg = self.session.expect(Packet::PeerReady).await?;
        let uploader = self.session.body(msg.peer_addr()).await?;
        info!(uid = %self.uid, %uploader, "introduced to uploader");
        self.session.close();
        Ok(uploader)
    }
}

/// Connects to the puncher as a downloader and obtains a UID.
pub async fn register_downloader(config: &TransferConfig) -> Result<PendingDownload, TransferError> {
    let puncher = resolve(&config.puncher_addr).await?;
    let stream = connect_reusable(puncher).await?;
    let local_addr = stream.local_addr()?;
    debug!(%puncher, %local_addr, "connected to puncher");
    let stream = secure_connect(stream, config.handshake_timeout).await?;

    let mut session = Session::open(Role::Downloader, stream, CURRENT);
    session.declare_version().await?;
    session
        .send(Message::client_type(ClientType::Downloader))
        .await?;

    session.transition(State::AwaitUidAssignment);
    let msg = session
        .expect_within(Packet::UidAssignment, config.handshake_timeout)
        .await?;
    let uid = session.body(msg.uid()).await?;
    session.set_uid(uid);
    info!(%uid, "registered with puncher");

    session.transition(State::AwaitPeer);
    Ok(PendingDownload {
        session,
        uid,
        local_addr,
    })
}

/// Asks the puncher to introduce this uploader to the downloader holding
/// `uid`, returning the downloader's address.
pub async fn request_downloader(
    config: &TransferConfig,
    uid: Uid,
) -> Result<SocketAddr, TransferError> {
    let stream = TcpStream::connect(&config.puncher_addr).await?;
    stream.set_nodelay(true)?;
    let stream = secure_connect(stream, config.handshake_timeout).await?;

    let mut session = Session::open(Role::Uploader, stream, CURRENT);
    session.declare_version().await?;
    session
        .send(Message::client_type(ClientType::Uploader))
        .await?;

    session.transition(State::RequestPeer);
    session.set_uid(uid);
    session.send(Message::uid_request(&uid)).await?;

    let answer = tokio::time::timeout(
        config.handshake_timeout,
        session.expect_any(&[Packet::PeerReady, Packet::PeerNotFound]),
    )
    .await;
    let msg = match answer {
        Ok(res) => res?,
        Err(_) => {
            session.halt("no answer to uid request").await;
            return Err(SessionError::Timeout(State::RequestPeer).into());
        }
    };

    if msg.packet == Packet::PeerNotFound {
        info!(%uid, "puncher has no downloader for uid");
        session.close();
        return Err(TransferError::PeerNotFound(uid));
    }

    let downloader = session.body(msg.peer_addr()).await?;
    session.close();
    info!(%uid, %downloader, "introduced to downloader");
    Ok(downloader)
}
