//! Error types for the puncher.

use transhift_protocol::Uid;
use transhift_security::SecurityError;
use transhift_session::SessionError;

/// Errors produced by the puncher server and its connection handlers.
#[derive(Debug, thiserror::Error)]
pub enum PuncherError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tls(#[from] SecurityError),

    #[error("invalid puncher configuration: {0}")]
    InvalidConfig(String),
}

/// No pending downloader holds the requested UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no pending downloader for uid {0}")]
pub struct NotFoundError(pub Uid);
