//! Downloader and uploader sides of a transhift transfer.
//!
//! A transfer has three phases:
//! 1. Both peers meet at the puncher ([`punch`]); the downloader receives a
//!    UID, the uploader presents it, and each learns the other's address.
//! 2. The uploader connects directly to the downloader, which listens on the
//!    local port it used for the puncher ([`net`]).
//! 3. The uploader announces and streams one file; the downloader verifies
//!    its SHA-256 and answers with the verdict ([`uploader`], [`downloader`]).

pub mod checksum;
pub mod downloader;
pub mod net;
pub mod punch;
mod types;
pub mod uploader;
mod validation;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info};

use transhift_protocol::{CURRENT, Uid};
use transhift_security::{Identity, SecurityError};
use transhift_session::{Role, Session, SessionError, State};

pub use punch::{PendingDownload, register_downloader, request_downloader};
pub use types::{BackoffConfig, DEFAULT_PUNCHER_ADDR, TransferConfig, TransferReport};
pub use validation::validate_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tls(#[from] SecurityError),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("no downloader is waiting for uid {0}")]
    PeerNotFound(Uid),

    #[error("cannot resolve {0}")]
    Resolve(String),

    #[error("could not connect to peer {addr} after {attempts} attempts: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Starts a session with a directly connected peer and announces the local
/// protocol version.
pub async fn peer_session<S>(role: Role, stream: S) -> Result<Session, TransferError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut session = Session::open(role, stream, CURRENT);
    session.declare_version().await?;
    Ok(session)
}

/// Completes a registered download: waits for the introduction, accepts the
/// uploader's connection, presenting `identity` to it, and stores the file
/// in `dir`.
pub async fn download(
    pending: PendingDownload,
    config: &TransferConfig,
    identity: &Identity,
    dir: &Path,
) -> Result<TransferReport, TransferError> {
    let uid = pending.uid();
    let local_addr = pending.local_addr();
    let uploader = pending.wait_for_uploader().await?;

    let (stream, from) = net::accept_peer(local_addr, config.handshake_timeout).await?;
    if from.ip() != uploader.ip() {
        debug!(%uid, expected = %uploader, actual = %from, "peer connected from an unexpected address");
    }
    let stream = net::secure_accept(stream, identity, config.handshake_timeout).await?;

    let mut session = peer_session(Role::Downloader, stream).await?;
    session.set_uid(uid);
    session.transition(State::AwaitUploaderReady);
    let report = downloader::receive_file(&mut session, dir).await?;
    info!(%uid, name = %report.file.name, verified = report.is_verified(), "download finished");
    Ok(report)
}

/// Sends the file at `path` to the downloader waiting under `uid`.
pub async fn upload(
    config: &TransferConfig,
    uid: Uid,
    path: &Path,
) -> Result<TransferReport, TransferError> {
    // Describe first so a bad path fails before anyone is contacted.
    let info = uploader::describe_file(path).await?;

    let downloader = request_downloader(config, uid).await?;
    let stream = net::connect_peer(downloader, &config.backoff).await?;
    let stream = net::secure_connect(stream, config.handshake_timeout).await?;

    let mut session = peer_session(Role::Uploader, stream).await?;
    session.set_uid(uid);
    let file = tokio::fs::File::open(path).await?;
    let report = uploader::send(&mut session, info, &mut BufReader::new(file)).await?;
    info!(%uid, name = %report.file.name, verified = report.is_verified(), "upload finished");
    Ok(report)
}
