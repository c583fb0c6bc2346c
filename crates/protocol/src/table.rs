//! Versioned packet tables.
//!
//! A table is immutable and passed explicitly to the [`Codec`](crate::Codec).
//! Both endpoints must use the same table; the `Version` packet carries
//! [`ProtocolTable::version`] so a mismatch is detected and rejected.

use crate::packet::Packet;
use crate::{HASH_LEN, PEER_ADDR_LEN, UID_LEN};

/// How a packet's body length is determined on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyClass {
    /// No body follows the tag.
    None,
    /// Exactly this many bytes follow the tag.
    Fixed(usize),
    /// A one-byte length follows the tag, then that many bytes.
    Variable,
}

/// One row of a protocol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub tag: u8,
    pub packet: Packet,
    pub body: BodyClass,
}

impl TableEntry {
    pub const fn new(tag: u8, packet: Packet, body: BodyClass) -> Self {
        Self { tag, packet, body }
    }
}

const fn entry(tag: u8, packet: Packet, body: BodyClass) -> TableEntry {
    TableEntry::new(tag, packet, body)
}

/// An immutable tag/body-class assignment for one protocol version.
#[derive(Debug)]
pub struct ProtocolTable {
    version: u8,
    entries: &'static [TableEntry],
}

impl ProtocolTable {
    pub const fn new(version: u8, entries: &'static [TableEntry]) -> Self {
        Self { version, entries }
    }

    /// Version byte announced in `Version` packets.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn entries(&self) -> &'static [TableEntry] {
        self.entries
    }

    /// Looks up the entry for a tag read off the wire.
    pub fn by_tag(&self, tag: u8) -> Option<&'static TableEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Looks up the entry for a packet about to be written.
    pub fn by_packet(&self, packet: Packet) -> Option<&'static TableEntry> {
        self.entries.iter().find(|e| e.packet == packet)
    }
}

/// Protocol version 1.
pub static V1: ProtocolTable = ProtocolTable::new(
    1,
    &[
        entry(0x00, Packet::Ping, BodyClass::None),
        entry(0x01, Packet::Pong, BodyClass::None),
        entry(0x02, Packet::ClientType, BodyClass::Fixed(1)),
        entry(0x03, Packet::UidAssignment, BodyClass::Fixed(UID_LEN)),
        entry(0x04, Packet::UidRequest, BodyClass::Fixed(UID_LEN)),
        entry(0x05, Packet::FileName, BodyClass::Variable),
        entry(0x06, Packet::FileSize, BodyClass::Fixed(8)),
        entry(0x07, Packet::FileHash, BodyClass::Fixed(HASH_LEN)),
        entry(0x08, Packet::Verification, BodyClass::Fixed(1)),
        entry(0x09, Packet::ProtocolError, BodyClass::Variable),
        entry(0x0A, Packet::InternalError, BodyClass::Variable),
        entry(0x0B, Packet::PeerNotFound, BodyClass::None),
        entry(0x0C, Packet::PeerReady, BodyClass::Fixed(PEER_ADDR_LEN)),
        entry(0x0D, Packet::UploaderReady, BodyClass::None),
        entry(0x0E, Packet::Version, BodyClass::Fixed(1)),
        entry(0x0F, Packet::Compatible, BodyClass::None),
        entry(0x10, Packet::Incompatible, BodyClass::None),
        entry(0x11, Packet::Halt, BodyClass::Variable),
        entry(0x12, Packet::FileChunk, BodyClass::Variable),
    ],
);

/// The table this build speaks.
pub static CURRENT: &ProtocolTable = &V1;
