use std::fmt;

/// Which side of the protocol a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Puncher,
    Downloader,
    Uploader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Puncher => f.write_str("puncher"),
            Role::Downloader => f.write_str("downloader"),
            Role::Uploader => f.write_str("uploader"),
        }
    }
}

/// Handshake step a session is in.
///
/// Puncher, per connection:
/// `AwaitClientType -> AssignUid -> AwaitClaimOrDisconnect -> Terminal` for
/// downloaders, `AwaitClientType -> AwaitUidRequest -> Introduce -> Terminal`
/// for uploaders.
///
/// Clients talking to the puncher: `Register -> AwaitUidAssignment ->
/// AwaitPeer` (downloader) and `Register -> RequestPeer` (uploader).
///
/// Downloader data phase: `AwaitUploaderReady -> AwaitFileName ->
/// AwaitFileSize -> AwaitFileHash -> ReceiveBytes -> CompareHash -> Terminal`.
///
/// Uploader data phase: `SendUploaderReady -> SendFileName -> SendFileSize ->
/// SendFileHash -> SendBytes -> AwaitVerification -> Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    // Puncher.
    AwaitClientType,
    AssignUid,
    AwaitClaimOrDisconnect,
    AwaitUidRequest,
    Introduce,

    // Client side of the puncher exchange.
    Register,
    AwaitUidAssignment,
    AwaitPeer,
    RequestPeer,

    // Downloader data phase.
    AwaitUploaderReady,
    AwaitFileName,
    AwaitFileSize,
    AwaitFileHash,
    ReceiveBytes,
    CompareHash,

    // Uploader data phase.
    SendUploaderReady,
    SendFileName,
    SendFileSize,
    SendFileHash,
    SendBytes,
    AwaitVerification,

    Terminal,
}

impl State {
    /// Initial state of a fresh session for `role`.
    pub fn initial(role: Role) -> Self {
        match role {
            Role::Puncher => State::AwaitClientType,
            Role::Downloader | Role::Uploader => State::Register,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == State::Terminal
    }

    /// True once file content is being exchanged. Version negotiation is
    /// closed from here on.
    pub fn in_data_phase(self) -> bool {
        matches!(
            self,
            State::ReceiveBytes
                | State::CompareHash
                | State::SendBytes
                | State::AwaitVerification
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            State::AwaitClientType => "await_client_type",
            State::AssignUid => "assign_uid",
            State::AwaitClaimOrDisconnect => "await_claim_or_disconnect",
            State::AwaitUidRequest => "await_uid_request",
            State::Introduce => "introduce",
            State::Register => "register",
            State::AwaitUidAssignment => "await_uid_assignment",
            State::AwaitPeer => "await_peer",
            State::RequestPeer => "request_peer",
            State::AwaitUploaderReady => "await_uploader_ready",
            State::AwaitFileName => "await_file_name",
            State::AwaitFileSize => "await_file_size",
            State::AwaitFileHash => "await_file_hash",
            State::ReceiveBytes => "receive_bytes",
            State::CompareHash => "compare_hash",
            State::SendUploaderReady => "send_uploader_ready",
            State::SendFileName => "send_file_name",
            State::SendFileSize => "send_file_size",
            State::SendFileHash => "send_file_hash",
            State::SendBytes => "send_bytes",
            State::AwaitVerification => "await_verification",
            State::Terminal => "terminal",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
