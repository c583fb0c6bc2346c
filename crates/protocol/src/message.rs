use std::net::SocketAddr;

use crate::error::{BodyError, EncodingError};
use crate::packet::Packet;
use crate::types::{
    ClientType, FileHash, Uid, Verification, decode_peer_addr, encode_peer_addr,
};
use crate::{HASH_LEN, MAX_VARIABLE_BODY, UID_LEN};

/// A single protocol message: a packet kind and its raw body.
///
/// Typed constructors build bodies of the right shape; the
/// [`Codec`](crate::Codec) checks the body against the table it was built
/// with before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub packet: Packet,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(packet: Packet, body: impl Into<Vec<u8>>) -> Self {
        Self {
            packet,
            body: body.into(),
        }
    }

    /// A message with an empty body.
    pub fn bodiless(packet: Packet) -> Self {
        Self {
            packet,
            body: Vec::new(),
        }
    }

    pub fn client_type(client_type: ClientType) -> Self {
        Self::new(Packet::ClientType, vec![client_type.to_byte()])
    }

    pub fn uid_assignment(uid: &Uid) -> Self {
        Self::new(Packet::UidAssignment, uid.as_bytes().to_vec())
    }

    pub fn uid_request(uid: &Uid) -> Self {
        Self::new(Packet::UidRequest, uid.as_bytes().to_vec())
    }

    pub fn peer_ready(addr: SocketAddr) -> Self {
        Self::new(Packet::PeerReady, encode_peer_addr(addr).to_vec())
    }

    pub fn version(version: u8) -> Self {
        Self::new(Packet::Version, vec![version])
    }

    /// Fails when the name does not fit in a variable-length body.
    pub fn file_name(name: &str) -> Result<Self, EncodingError> {
        Self::variable(Packet::FileName, name.as_bytes())
    }

    pub fn file_size(size: u64) -> Self {
        Self::new(Packet::FileSize, size.to_be_bytes().to_vec())
    }

    pub fn file_hash(hash: &FileHash) -> Self {
        Self::new(Packet::FileHash, hash.to_vec())
    }

    /// Fails when the chunk is longer than a variable-length body allows.
    pub fn file_chunk(data: &[u8]) -> Result<Self, EncodingError> {
        Self::variable(Packet::FileChunk, data)
    }

    pub fn verification(verification: Verification) -> Self {
        Self::new(Packet::Verification, vec![verification.to_byte()])
    }

    /// A fault blamed on the receiving peer. Long text is truncated.
    pub fn protocol_error(text: &str) -> Self {
        Self::new(Packet::ProtocolError, truncate_text(text).as_bytes().to_vec())
    }

    /// A fault on the sending side. Long text is truncated.
    pub fn internal_error(text: &str) -> Self {
        Self::new(Packet::InternalError, truncate_text(text).as_bytes().to_vec())
    }

    /// An orderly termination request. Long text is truncated.
    pub fn halt(reason: &str) -> Self {
        Self::new(Packet::Halt, truncate_text(reason).as_bytes().to_vec())
    }

    fn variable(packet: Packet, body: &[u8]) -> Result<Self, EncodingError> {
        if body.len() > MAX_VARIABLE_BODY {
            return Err(EncodingError::TooLong {
                packet,
                actual: body.len(),
            });
        }
        Ok(Self::new(packet, body.to_vec()))
    }

    // -----------------------------------------------------------------------
    // Body accessors
    // -----------------------------------------------------------------------

    /// Fails unless this message is of the given kind.
    pub fn expect_packet(&self, expected: Packet) -> Result<(), BodyError> {
        if self.packet == expected {
            Ok(())
        } else {
            Err(BodyError::WrongPacket {
                expected,
                actual: self.packet,
            })
        }
    }

    /// UID carried by `UidAssignment` or `UidRequest`.
    pub fn uid(&self) -> Result<Uid, BodyError> {
        let bytes: [u8; UID_LEN] = self.fixed()?;
        Ok(Uid::from_bytes(bytes))
    }

    pub fn client_type_value(&self) -> Result<ClientType, BodyError> {
        self.expect_packet(Packet::ClientType)?;
        let [byte] = self.fixed::<1>()?;
        ClientType::from_byte(byte)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, BodyError> {
        self.expect_packet(Packet::PeerReady)?;
        decode_peer_addr(&self.body)
    }

    pub fn version_value(&self) -> Result<u8, BodyError> {
        self.expect_packet(Packet::Version)?;
        let [byte] = self.fixed::<1>()?;
        Ok(byte)
    }

    pub fn file_size_value(&self) -> Result<u64, BodyError> {
        self.expect_packet(Packet::FileSize)?;
        Ok(u64::from_be_bytes(self.fixed()?))
    }

    pub fn file_hash_value(&self) -> Result<FileHash, BodyError> {
        self.expect_packet(Packet::FileHash)?;
        self.fixed::<HASH_LEN>()
    }

    pub fn verification_value(&self) -> Result<Verification, BodyError> {
        self.expect_packet(Packet::Verification)?;
        let [byte] = self.fixed::<1>()?;
        Verification::from_byte(byte)
    }

    /// Body as UTF-8 text (`FileName`, `ProtocolError`, `InternalError`, `Halt`).
    pub fn text(&self) -> Result<&str, BodyError> {
        std::str::from_utf8(&self.body).map_err(|_| BodyError::InvalidUtf8(self.packet))
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], BodyError> {
        self.body.as_slice().try_into().map_err(|_| BodyError::Length {
            packet: self.packet,
            expected: N,
            actual: self.body.len(),
        })
    }
}

/// Cuts `text` to at most [`MAX_VARIABLE_BODY`] bytes on a char boundary.
fn truncate_text(text: &str) -> &str {
    if text.len() <= MAX_VARIABLE_BODY {
        return text;
    }
    let mut end = MAX_VARIABLE_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
