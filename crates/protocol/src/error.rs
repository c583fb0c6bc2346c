//! Error types for the wire protocol.

use crate::packet::Packet;

/// Errors raised while building or encoding a message.
///
/// These are construction errors: the message never reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("{packet} is not part of protocol v{version}")]
    UnsupportedPacket { packet: Packet, version: u8 },

    #[error("{packet} carries no body, got {actual} bytes")]
    UnexpectedBody { packet: Packet, actual: usize },

    #[error("{packet} body must be {expected} bytes, got {actual}")]
    FixedLength {
        packet: Packet,
        expected: usize,
        actual: usize,
    },

    #[error("{packet} body too long: {actual} bytes (max 255)")]
    TooLong { packet: Packet, actual: usize },
}

/// Errors raised while reading a frame off a stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown packet tag 0x{0:02x}")]
    UnknownPacket(u8),
}

/// Errors raised while interpreting a decoded message body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("expected {expected}, got {actual}")]
    WrongPacket { expected: Packet, actual: Packet },

    #[error("{packet} body must be {expected} bytes, got {actual}")]
    Length {
        packet: Packet,
        expected: usize,
        actual: usize,
    },

    #[error("invalid client type {0}")]
    InvalidClientType(u8),

    #[error("invalid verification flag {0}")]
    InvalidVerification(u8),

    #[error("{0} body is not valid UTF-8")]
    InvalidUtf8(Packet),
}
