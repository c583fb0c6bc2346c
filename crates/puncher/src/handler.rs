//! Per-connection puncher handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use transhift_protocol::{CURRENT, ClientType, Message, Packet, Uid};
use transhift_session::{Role, Session, State};

use crate::PuncherError;
use crate::rendezvous::RendezvousTable;
use crate::server::PuncherConfig;

/// Handle the rendezvous table keeps for a waiting downloader.
pub struct PendingDownloader {
    /// Address the downloader connected from.
    pub addr: SocketAddr,
    introduce: oneshot::Sender<Introduction>,
}

/// Sent from the uploader's handler to the claimed downloader's handler.
struct Introduction {
    uploader: SocketAddr,
    /// Resolves to whether `PeerReady` reached the downloader.
    delivered: oneshot::Sender<bool>,
}

pub(crate) type Table = RendezvousTable<PendingDownloader>;

/// Everything a connection handler needs from its server.
pub(crate) struct Context {
    pub(crate) config: PuncherConfig,
    pub(crate) table: Arc<Table>,
    pub(crate) cancel: CancellationToken,
}

/// Unregisters a pending UID when the downloader's handler exits.
struct PendingGuard {
    table: Arc<Table>,
    uid: Option<Uid>,
}

impl PendingGuard {
    /// The entry was claimed; nothing left to clean up.
    fn disarm(&mut self) {
        self.uid = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(uid) = self.uid.take() {
            self.table.unregister(&uid);
        }
    }
}

pub(crate) async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    ctx: Arc<Context>,
) -> Result<(), PuncherError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let mut session = Session::open(Role::Puncher, stream, CURRENT);

    let msg = session
        .expect_within(Packet::ClientType, ctx.config.handshake_timeout)
        .await?;
    let client_type = session.body(msg.client_type_value()).await?;
    session.set_peer_client_type(client_type);
    info!(%peer, %client_type, "client connected");

    match client_type {
        ClientType::Downloader => handle_downloader(&mut session, peer, &ctx).await,
        ClientType::Uploader => handle_uploader(&mut session, peer, &ctx).await,
    }
}

async fn handle_downloader(
    session: &mut Session,
    peer: SocketAddr,
    ctx: &Context,
) -> Result<(), PuncherError> {
    let config = &ctx.config;
    session.transition(State::AssignUid);

    let (introduce, mut introduced) = oneshot::channel();
    let uid = ctx.table.register(PendingDownloader {
        addr: peer,
        introduce,
    });
    let mut guard = PendingGuard {
        table: ctx.table.clone(),
        uid: Some(uid),
    };
    session.set_uid(uid);
    session.send(Message::uid_assignment(&uid)).await?;
    info!(%peer, %uid, "uid assigned");

    session.transition(State::AwaitClaimOrDisconnect);

    let expiry = sleep(config.pending_timeout);
    tokio::pin!(expiry);
    let liveness = sleep(config.pong_wait);
    tokio::pin!(liveness);
    let mut ping = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                session.halt("puncher shutting down").await;
                return Ok(());
            }

            res = &mut introduced => {
                guard.disarm();
                let Ok(intro) = res else {
                    session.halt("registration dropped").await;
                    return Ok(());
                };

                session.transition(State::Introduce);
                let sent = session.send(Message::peer_ready(intro.uploader)).await;
                let _ = intro.delivered.send(sent.is_ok());
                sent?;

                info!(%peer, %uid, uploader = %intro.uploader, "downloader introduced");
                session.close();
                return Ok(());
            }

            () = &mut expiry => {
                info!(%peer, %uid, "pending downloader expired");
                session.halt("no uploader arrived").await;
                return Ok(());
            }

            () = &mut liveness => {
                warn!(%peer, %uid, "pong timeout, dropping downloader");
                session.close();
                return Ok(());
            }

            _ = ping.tick() => {
                session.send(Message::bodiless(Packet::Ping)).await?;
            }

            res = session.next() => {
                let msg = res?;
                liveness.as_mut().reset(Instant::now() + config.pong_wait);
                if msg.packet != Packet::Pong {
                    let err = session
                        .violation(format!("unexpected {} while waiting for an uploader", msg.packet))
                        .await;
                    return Err(err.into());
                }
            }
        }
    }
}

async fn handle_uploader(
    session: &mut Session,
    peer: SocketAddr,
    ctx: &Context,
) -> Result<(), PuncherError> {
    let config = &ctx.config;
    session.transition(State::AwaitUidRequest);

    let msg = session
        .expect_within(Packet::UidRequest, config.handshake_timeout)
        .await?;
    let uid = session.body(msg.uid()).await?;
    session.set_uid(uid);

    session.transition(State::Introduce);
    let pending = match ctx.table.claim(&uid) {
        Ok(pending) => pending,
        Err(e) => {
            info!(%peer, "{e}");
            return peer_not_found(session).await;
        }
    };

    let (delivered, delivery) = oneshot::channel();
    let handed_over = pending
        .introduce
        .send(Introduction {
            uploader: peer,
            delivered,
        })
        .is_ok();
    let reached = handed_over
        && matches!(
            tokio::time::timeout(config.handshake_timeout, delivery).await,
            Ok(Ok(true))
        );
    if !reached {
        warn!(%peer, %uid, "claimed downloader is gone");
        return peer_not_found(session).await;
    }

    session
        .send(Message::peer_ready(pending.addr))
        .await?;
    info!(%peer, %uid, downloader = %pending.addr, "uploader introduced");
    session.close();
    Ok(())
}

async fn peer_not_found(session: &mut Session) -> Result<(), PuncherError> {
    session.send(Message::bodiless(Packet::PeerNotFound)).await?;
    debug!("sent peer_not_found");
    session.close();
    Ok(())
}
