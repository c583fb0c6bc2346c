//! Handshake state machine core for transhift.
//!
//! A [`Session`] owns one connection's message flows and its per-connection
//! state. It handles the control packets every role treats the same way
//! (ping, version negotiation, error and halt packets) so the role-specific
//! handlers only see the packets their current step is interested in.

mod error;
mod state;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use transhift_connection::{Inbound, Outbound};
use transhift_protocol::{
    BodyError, ClientType, Codec, FileInfo, Message, Packet, ProtocolTable, Uid, Verification,
};

pub use error::SessionError;
pub use state::{Role, State};

/// One connection's handshake state.
pub struct Session {
    role: Role,
    state: State,
    inbound: Inbound,
    outbound: Outbound,
    table: &'static ProtocolTable,
    uid: Option<Uid>,
    peer_client_type: Option<ClientType>,
    peer_version: Option<u8>,
    file_info: Option<FileInfo>,
    verification: Option<Verification>,
}

impl Session {
    /// Opens a connection pump over `stream` and starts a session on it.
    pub fn open<S>(role: Role, stream: S, table: &'static ProtocolTable) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (inbound, outbound) = transhift_connection::open(stream, Codec::new(table));
        Self::from_parts(role, inbound, outbound, table)
    }

    pub fn from_parts(
        role: Role,
        inbound: Inbound,
        outbound: Outbound,
        table: &'static ProtocolTable,
    ) -> Self {
        Self {
            role,
            state: State::initial(role),
            inbound,
            outbound,
            table,
            uid: None,
            peer_client_type: None,
            peer_version: None,
            file_info: None,
            verification: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn table(&self) -> &'static ProtocolTable {
        self.table
    }

    pub fn uid(&self) -> Option<Uid> {
        self.uid
    }

    pub fn set_uid(&mut self, uid: Uid) {
        self.uid = Some(uid);
    }

    pub fn peer_client_type(&self) -> Option<ClientType> {
        self.peer_client_type
    }

    pub fn set_peer_client_type(&mut self, client_type: ClientType) {
        self.peer_client_type = Some(client_type);
    }

    /// Version the peer declared, if it sent one.
    pub fn peer_version(&self) -> Option<u8> {
        self.peer_version
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn set_file_info(&mut self, info: FileInfo) {
        self.file_info = Some(info);
    }

    pub fn verification(&self) -> Option<Verification> {
        self.verification
    }

    pub fn set_verification(&mut self, verification: Verification) {
        self.verification = Some(verification);
    }

    /// Sender handle, e.g. for a keepalive task running beside the session.
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn transition(&mut self, next: State) {
        if self.state != next {
            debug!(role = %self.role, from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    /// Sends `msg` and waits for it to be written. A failed send is terminal.
    pub async fn send(&mut self, msg: Message) -> Result<(), SessionError> {
        if let Err(e) = self.outbound.send(msg).await {
            self.transition(State::Terminal);
            return Err(e.into());
        }
        Ok(())
    }

    /// Announces this side's wire table version without waiting for an answer.
    pub async fn declare_version(&mut self) -> Result<(), SessionError> {
        self.send(Message::version(self.table.version())).await
    }

    /// Next message the current step has to handle.
    ///
    /// `Ping` is answered with `Pong`, `Version` with `Compatible` or
    /// `Incompatible`, and `Compatible` is consumed. `Version` is only
    /// negotiated before the data phase; later it is a protocol violation.
    /// `Incompatible`, error packets and `Halt` end the session with the
    /// matching error.
    pub async fn next(&mut self) -> Result<Message, SessionError> {
        loop {
            let msg = match self.inbound.recv().await {
                Ok(msg) => msg,
                Err(e) => {
                    self.transition(State::Terminal);
                    return Err(e.into());
                }
            };

            match msg.packet {
                Packet::Ping => {
                    trace!(role = %self.role, "ping");
                    self.send(Message::bodiless(Packet::Pong)).await?;
                }
                Packet::Version if self.state.in_data_phase() => {
                    let state = self.state;
                    return Err(self
                        .violation(format!("version negotiation in state {state}"))
                        .await);
                }
                Packet::Version => {
                    let remote = self.body(msg.version_value()).await?;
                    self.negotiate(remote).await?;
                }
                Packet::Compatible => {
                    trace!(role = %self.role, "peer accepted our version");
                }
                packet if packet.is_terminal() => return Err(self.ended_by_peer(&msg)),
                _ => return Ok(msg),
            }
        }
    }

    /// Error for a terminal packet received from the peer.
    fn ended_by_peer(&mut self, msg: &Message) -> SessionError {
        let text = lossy_text(msg);
        self.transition(State::Terminal);
        match msg.packet {
            Packet::Incompatible => {
                warn!(role = %self.role, "peer rejected our protocol version");
                SessionError::VersionRejected
            }
            Packet::ProtocolError => {
                warn!(role = %self.role, "peer reported protocol error: {text}");
                SessionError::PeerProtocolError(text)
            }
            Packet::InternalError => {
                warn!(role = %self.role, "peer reported internal error: {text}");
                SessionError::PeerInternalError(text)
            }
            _ => {
                debug!(role = %self.role, "peer halted: {text}");
                SessionError::Halted(text)
            }
        }
    }

    /// Next message, which must be `packet`. Anything else is reported to
    /// the peer as a protocol error and ends the session.
    pub async fn expect(&mut self, packet: Packet) -> Result<Message, SessionError> {
        self.expect_any(&[packet]).await
    }

    /// Like [`expect`](Self::expect) with several acceptable packets.
    pub async fn expect_any(&mut self, packets: &[Packet]) -> Result<Message, SessionError> {
        let msg = self.next().await?;
        if packets.contains(&msg.packet) {
            return Ok(msg);
        }
        let state = self.state;
        self.report_protocol_error(&format!("unexpected {} in state {state}", msg.packet))
            .await;
        Err(SessionError::Unexpected {
            state,
            actual: msg.packet,
        })
    }

    /// [`expect`](Self::expect) bounded by `timeout`. On expiry the peer is
    /// halted and the session ends.
    pub async fn expect_within(
        &mut self,
        packet: Packet,
        timeout: Duration,
    ) -> Result<Message, SessionError> {
        let state = self.state;
        match tokio::time::timeout(timeout, self.expect(packet)).await {
            Ok(res) => res,
            Err(_) => {
                self.halt(&format!("timed out in state {state}")).await;
                Err(SessionError::Timeout(state))
            }
        }
    }

    /// Unwraps a decoded body, reporting a malformed one to the peer.
    pub async fn body<T>(&mut self, res: Result<T, BodyError>) -> Result<T, SessionError> {
        match res {
            Ok(value) => Ok(value),
            Err(e) => {
                self.report_protocol_error(&e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Reports a fault blamed on the peer and returns the matching error.
    pub async fn violation(&mut self, text: impl Into<String>) -> SessionError {
        let text = text.into();
        self.report_protocol_error(&text).await;
        SessionError::Protocol(text)
    }

    /// Best-effort `ProtocolError` to the peer; ends the session.
    pub async fn report_protocol_error(&mut self, text: &str) {
        warn!(role = %self.role, state = %self.state, "protocol error: {text}");
        self.terminate(Message::protocol_error(text)).await;
    }

    /// Best-effort `InternalError` to the peer; ends the session.
    pub async fn report_internal_error(&mut self, text: &str) {
        warn!(role = %self.role, state = %self.state, "internal error: {text}");
        self.terminate(Message::internal_error(text)).await;
    }

    /// Best-effort `Halt` to the peer; ends the session.
    pub async fn halt(&mut self, reason: &str) {
        debug!(role = %self.role, state = %self.state, "halting: {reason}");
        self.terminate(Message::halt(reason)).await;
    }

    /// Ends the session and closes the connection.
    pub fn close(&mut self) {
        self.transition(State::Terminal);
        self.outbound.close();
    }

    async fn terminate(&mut self, msg: Message) {
        if !self.state.is_terminal() && !self.outbound.is_closed() {
            let _ = self.outbound.send(msg).await;
        }
        self.transition(State::Terminal);
    }

    async fn negotiate(&mut self, remote: u8) -> Result<(), SessionError> {
        self.peer_version = Some(remote);
        let local = self.table.version();
        if remote == local {
            trace!(role = %self.role, version = remote, "peer version compatible");
            return self.send(Message::bodiless(Packet::Compatible)).await;
        }

        warn!(role = %self.role, local, remote, "incompatible protocol version");
        self.terminate(Message::bodiless(Packet::Incompatible)).await;
        Err(SessionError::Incompatible { local, remote })
    }
}

fn lossy_text(msg: &Message) -> String {
    String::from_utf8_lossy(&msg.body).into_owned()
}

#[cfg(test)]
mod tests {
    use transhift_protocol::{Codec, V1};

    use super::*;

    /// A session on one end of a duplex and the raw flows of the other end.
    fn session(role: Role) -> (Session, Inbound, Outbound) {
        let (a, b) = tokio::io::duplex(1024);
        let session = Session::open(role, a, &V1);
        let (peer_in, peer_out) = transhift_connection::open(b, Codec::new(&V1));
        (session, peer_in, peer_out)
    }

    #[tokio::test]
    async fn ping_is_answered_and_skipped() {
        let (mut s, mut peer_in, peer_out) = session(Role::Downloader);

        peer_out.send(Message::bodiless(Packet::Ping)).await.unwrap();
        peer_out.send(Message::file_size(3)).await.unwrap();

        let msg = s.next().await.unwrap();
        assert_eq!(msg.packet, Packet::FileSize);
        assert_eq!(peer_in.recv().await.unwrap().packet, Packet::Pong);
    }

    #[tokio::test]
    async fn matching_version_is_compatible() {
        let (mut s, mut peer_in, peer_out) = session(Role::Uploader);

        peer_out.send(Message::version(1)).await.unwrap();
        peer_out.send(Message::bodiless(Packet::Compatible)).await.unwrap();
        peer_out.send(Message::bodiless(Packet::UploaderReady)).await.unwrap();

        let msg = s.expect(Packet::UploaderReady).await.unwrap();
        assert_eq!(msg.packet, Packet::UploaderReady);
        assert_eq!(s.peer_version(), Some(1));
        assert_eq!(peer_in.recv().await.unwrap().packet, Packet::Compatible);
    }

    #[tokio::test]
    async fn mismatched_version_is_incompatible() {
        let (mut s, mut peer_in, peer_out) = session(Role::Puncher);

        peer_out.send(Message::version(9)).await.unwrap();

        let err = s.next().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Incompatible { local: 1, remote: 9 }
        ));
        assert!(s.state().is_terminal());
        assert_eq!(peer_in.recv().await.unwrap().packet, Packet::Incompatible);
    }

    #[tokio::test]
    async fn version_during_data_phase_is_violation() {
        let (mut s, mut peer_in, peer_out) = session(Role::Downloader);
        s.transition(State::ReceiveBytes);

        peer_out.send(Message::file_chunk(b"he").unwrap()).await.unwrap();
        peer_out.send(Message::version(1)).await.unwrap();

        assert_eq!(s.expect(Packet::FileChunk).await.unwrap().body, b"he");
        let err = s.expect(Packet::FileChunk).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
        assert!(s.state().is_terminal());
        assert_eq!(s.peer_version(), None);

        let report = peer_in.recv().await.unwrap();
        assert_eq!(report.packet, Packet::ProtocolError);
        assert_eq!(
            report.text().unwrap(),
            "version negotiation in state receive_bytes"
        );
    }

    #[tokio::test]
    async fn version_during_metadata_is_still_negotiated() {
        let (mut s, mut peer_in, peer_out) = session(Role::Downloader);
        s.transition(State::AwaitFileName);

        peer_out.send(Message::version(1)).await.unwrap();
        peer_out.send(Message::file_name("a.txt").unwrap()).await.unwrap();

        assert_eq!(s.expect(Packet::FileName).await.unwrap().packet, Packet::FileName);
        assert_eq!(peer_in.recv().await.unwrap().packet, Packet::Compatible);
    }

    #[tokio::test]
    async fn incompatible_from_peer_aborts() {
        let (mut s, _peer_in, peer_out) = session(Role::Downloader);
        s.declare_version().await.unwrap();

        peer_out.send(Message::bodiless(Packet::Incompatible)).await.unwrap();

        assert!(matches!(
            s.next().await,
            Err(SessionError::VersionRejected)
        ));
        assert!(s.state().is_terminal());
    }

    #[tokio::test]
    async fn unexpected_packet_is_reported() {
        let (mut s, mut peer_in, peer_out) = session(Role::Downloader);
        s.transition(State::AwaitFileName);

        peer_out.send(Message::file_size(5)).await.unwrap();

        let err = s.expect(Packet::FileName).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Unexpected {
                state: State::AwaitFileName,
                actual: Packet::FileSize
            }
        ));

        let report = peer_in.recv().await.unwrap();
        assert_eq!(report.packet, Packet::ProtocolError);
        assert_eq!(
            report.text().unwrap(),
            "unexpected file_size in state await_file_name"
        );
        assert!(s.state().is_terminal());
    }

    #[tokio::test]
    async fn halt_and_errors_end_the_session() {
        let (mut s, _peer_in, peer_out) = session(Role::Uploader);
        peer_out.send(Message::halt("going away")).await.unwrap();
        match s.next().await {
            Err(SessionError::Halted(reason)) => assert_eq!(reason, "going away"),
            other => panic!("expected halt, got {other:?}"),
        }

        let (mut s, _peer_in, peer_out) = session(Role::Uploader);
        peer_out
            .send(Message::internal_error("disk full"))
            .await
            .unwrap();
        assert!(matches!(
            s.next().await,
            Err(SessionError::PeerInternalError(text)) if text == "disk full"
        ));

        let (mut s, _peer_in, peer_out) = session(Role::Uploader);
        peer_out
            .send(Message::protocol_error("bad name"))
            .await
            .unwrap();
        assert!(matches!(
            s.next().await,
            Err(SessionError::PeerProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let (mut s, mut peer_in, peer_out) = session(Role::Puncher);

        peer_out.send(Message::new(Packet::ClientType, vec![7])).await.unwrap();
        let msg = s.expect(Packet::ClientType).await.unwrap();
        let err = s.body(msg.client_type_value()).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::MalformedBody(BodyError::InvalidClientType(7))
        ));
        assert_eq!(peer_in.recv().await.unwrap().packet, Packet::ProtocolError);
    }

    #[tokio::test]
    async fn expect_within_times_out_with_halt() {
        tokio::time::pause();
        let (mut s, mut peer_in, _peer_out) = session(Role::Puncher);

        let err = s
            .expect_within(Packet::ClientType, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(State::AwaitClientType)));

        let halt = peer_in.recv().await.unwrap();
        assert_eq!(halt.packet, Packet::Halt);
    }

    #[tokio::test]
    async fn closed_peer_is_a_connection_error() {
        let (mut s, peer_in, peer_out) = session(Role::Downloader);
        drop(peer_in);
        drop(peer_out);

        match s.next().await {
            Err(SessionError::Connection(e)) => assert!(e.is_closed()),
            other => panic!("expected closed connection, got {other:?}"),
        }
        assert!(s.state().is_terminal());
    }
}
