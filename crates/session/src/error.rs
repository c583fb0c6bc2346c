//! Error types for handshake sessions.

use transhift_connection::ConnectionError;
use transhift_protocol::{BodyError, EncodingError, Packet};

use crate::state::State;

/// Why a session reached its terminal state without completing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("cannot build message: {0}")]
    Encoding(#[from] EncodingError),

    #[error("unexpected {actual} in state {state}")]
    Unexpected { state: State, actual: Packet },

    #[error("malformed body: {0}")]
    MalformedBody(#[from] BodyError),

    /// A fault detected locally and already reported to the peer.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("peer speaks protocol v{remote}, this side speaks v{local}")]
    Incompatible { local: u8, remote: u8 },

    #[error("peer rejected our protocol version")]
    VersionRejected,

    #[error("peer reported a protocol error: {0}")]
    PeerProtocolError(String),

    #[error("peer reported an internal error: {0}")]
    PeerInternalError(String),

    #[error("peer halted: {0}")]
    Halted(String),

    #[error("timed out in state {0}")]
    Timeout(State),
}
