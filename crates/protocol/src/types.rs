use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::BodyError;
use crate::packet::Packet;
use crate::{HASH_LEN, PEER_ADDR_LEN, UID_LEN};

/// SHA-256 digest of a file's content.
pub type FileHash = [u8; HASH_LEN];

/// Opaque identifier the puncher assigns to a pending downloader.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid([u8; UID_LEN]);

impl Uid {
    /// Generates a random UID (UUID v4 bytes).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    pub const fn from_bytes(bytes: [u8; UID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

/// Error returned when a UID string is not 32 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid uid {0:?}: expected {len} hex characters", len = UID_LEN * 2)]
pub struct ParseUidError(String);

impl FromStr for Uid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; UID_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| ParseUidError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Role a client declares right after connecting to the puncher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    Downloader,
    Uploader,
}

impl ClientType {
    pub fn to_byte(self) -> u8 {
        match self {
            ClientType::Downloader => 0,
            ClientType::Uploader => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, BodyError> {
        match byte {
            0 => Ok(ClientType::Downloader),
            1 => Ok(ClientType::Uploader),
            other => Err(BodyError::InvalidClientType(other)),
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::Downloader => f.write_str("downloader"),
            ClientType::Uploader => f.write_str("uploader"),
        }
    }
}

/// Outcome of the downloader's checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Digests matched.
    Good,
    /// Digests differed.
    Bad,
}

impl Verification {
    pub fn to_byte(self) -> u8 {
        match self {
            Verification::Good => 0,
            Verification::Bad => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, BodyError> {
        match byte {
            0 => Ok(Verification::Good),
            1 => Ok(Verification::Bad),
            other => Err(BodyError::InvalidVerification(other)),
        }
    }

    pub fn is_good(self) -> bool {
        self == Verification::Good
    }
}

/// Description of the single file transferred in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub hash: FileHash,
}

/// Encodes a socket address as 16 address bytes (IPv4 is mapped into IPv6)
/// followed by a big-endian port.
pub fn encode_peer_addr(addr: SocketAddr) -> [u8; PEER_ADDR_LEN] {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    let mut out = [0u8; PEER_ADDR_LEN];
    out[..16].copy_from_slice(&ip.octets());
    out[16..].copy_from_slice(&addr.port().to_be_bytes());
    out
}

/// Inverse of [`encode_peer_addr`]. IPv4-mapped addresses decode as IPv4.
pub fn decode_peer_addr(body: &[u8]) -> Result<SocketAddr, BodyError> {
    let bytes: [u8; PEER_ADDR_LEN] = body.try_into().map_err(|_| BodyError::Length {
        packet: Packet::PeerReady,
        expected: PEER_ADDR_LEN,
        actual: body.len(),
    })?;

    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes[..16]);
    let v6 = Ipv6Addr::from(octets);
    let ip = match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    };
    let port = u16::from_be_bytes([bytes[16], bytes[17]]);
    Ok(SocketAddr::new(ip, port))
}
