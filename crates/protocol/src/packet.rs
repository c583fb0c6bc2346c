use std::fmt;

/// Protocol message kind.
///
/// Tag bytes and body classes are not part of this type; they come from a
/// [`ProtocolTable`](crate::ProtocolTable) so that two table versions can
/// number the same packet differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Packet {
    // Keepalive
    Ping,
    Pong,

    // Rendezvous
    ClientType,
    UidAssignment,
    UidRequest,
    PeerNotFound,
    PeerReady,

    // Compatibility
    Version,
    Compatible,
    Incompatible,

    // Data phase
    UploaderReady,
    FileName,
    FileSize,
    FileHash,
    FileChunk,
    Verification,

    // Termination
    ProtocolError,
    InternalError,
    Halt,
}

impl Packet {
    /// Returns `true` for packets that end the session when received.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Packet::ProtocolError | Packet::InternalError | Packet::Halt | Packet::Incompatible
        )
    }

    /// Wire-level name, as used in logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Packet::Ping => "ping",
            Packet::Pong => "pong",
            Packet::ClientType => "client_type",
            Packet::UidAssignment => "uid_assignment",
            Packet::UidRequest => "uid_request",
            Packet::PeerNotFound => "peer_not_found",
            Packet::PeerReady => "peer_ready",
            Packet::Version => "version",
            Packet::Compatible => "compatible",
            Packet::Incompatible => "incompatible",
            Packet::UploaderReady => "uploader_ready",
            Packet::FileName => "file_name",
            Packet::FileSize => "file_size",
            Packet::FileHash => "file_hash",
            Packet::FileChunk => "file_chunk",
            Packet::Verification => "verification",
            Packet::ProtocolError => "protocol_error",
            Packet::InternalError => "internal_error",
            Packet::Halt => "halt",
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_packets() {
        assert!(Packet::Halt.is_terminal());
        assert!(Packet::ProtocolError.is_terminal());
        assert!(Packet::InternalError.is_terminal());
        assert!(Packet::Incompatible.is_terminal());
        assert!(!Packet::Compatible.is_terminal());
        assert!(!Packet::Verification.is_terminal());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(Packet::UidAssignment.to_string(), "uid_assignment");
        assert_eq!(Packet::FileChunk.to_string(), "file_chunk");
    }
}
