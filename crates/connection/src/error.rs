//! Error types for the connection pump.

use std::io;
use std::sync::Arc;

use transhift_protocol::{DecodeError, EncodingError};

/// Terminal error of a connection.
///
/// `Clone` so the first recorded error can be handed to every caller that
/// touches the connection afterwards.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    #[error("unknown packet tag 0x{0:02x}")]
    UnknownPacket(u8),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// True for an orderly close with no fault recorded.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionError::Closed)
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Transport(Arc::new(e))
    }
}

impl From<DecodeError> for ConnectionError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(e) => e.into(),
            DecodeError::UnknownPacket(tag) => ConnectionError::UnknownPacket(tag),
        }
    }
}
