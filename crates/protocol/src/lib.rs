//! Wire protocol for transhift.
//!
//! Defines the packets exchanged between the puncher, downloaders and
//! uploaders, the versioned table that assigns each packet a tag byte and a
//! body class, and the [`Codec`] that turns [`Message`]s into frames.
//!
//! # Wire format
//!
//! ```text
//! [1 byte: tag]
//! [1 byte: body length]   only for variable-length packets
//! [N bytes: body]         N = 0, the fixed length, or the length byte
//! ```
//!
//! See [`table::V1`] for the current tag assignments.

pub mod codec;
pub mod error;
pub mod message;
pub mod packet;
pub mod table;
pub mod types;

pub use codec::Codec;
pub use error::{BodyError, DecodeError, EncodingError};
pub use message::Message;
pub use packet::Packet;
pub use table::{BodyClass, CURRENT, ProtocolTable, TableEntry, V1};
pub use types::{ClientType, FileHash, FileInfo, Uid, Verification};

/// Length of a UID issued by the puncher.
pub const UID_LEN: usize = 16;

/// Length of a SHA-256 file digest.
pub const HASH_LEN: usize = 32;

/// Length of an encoded peer address (IPv6 or IPv4-mapped + port).
pub const PEER_ADDR_LEN: usize = 18;

/// Largest body a variable-length packet can carry.
pub const MAX_VARIABLE_BODY: usize = u8::MAX as usize;
