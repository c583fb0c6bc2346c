//! Connection pump for transhift.
//!
//! [`open`] splits a duplex byte stream into an [`Inbound`] message source and
//! an [`Outbound`] message sink, each serviced by its own task. The two tasks
//! share one cancellation token: when either stops (end of stream, transport
//! or codec error, explicit close, a dropped handle) both stop, and the first
//! recorded error becomes the terminal error every later caller sees.

mod error;
mod pumps;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::DropGuard;

use transhift_protocol::{Codec, Message};

pub use error::ConnectionError;

use pumps::{Outgoing, Shared};

/// Starts both pumps over `stream` and returns the two message flows.
///
/// Must be called inside a Tokio runtime.
pub fn open<S>(stream: S, codec: Codec) -> (Inbound, Outbound)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let shared = Arc::new(Shared::new());

    // Capacity 1: one message in flight per direction.
    let (inbound_tx, inbound_rx) = mpsc::channel(1);
    let (outbound_tx, outbound_rx) = mpsc::channel(1);

    tokio::spawn(pumps::read::read_pump(
        reader,
        codec,
        inbound_tx,
        shared.clone(),
    ));
    tokio::spawn(pumps::write::write_pump(
        writer,
        codec,
        outbound_rx,
        shared.clone(),
    ));

    let inbound = Inbound {
        rx: inbound_rx,
        shared: shared.clone(),
        _guard: shared.cancel.clone().drop_guard(),
    };
    let outbound = Outbound {
        tx: outbound_tx,
        shared,
    };
    (inbound, outbound)
}

/// Receiving half of a connection. Dropping it closes the connection.
pub struct Inbound {
    rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
    _guard: DropGuard,
}

impl Inbound {
    /// Next message in arrival order.
    ///
    /// Messages decoded before the connection stopped are still delivered;
    /// after that every call returns the terminal error.
    pub async fn recv(&mut self) -> Result<Message, ConnectionError> {
        match self.rx.recv().await {
            Some(msg) => Ok(msg),
            None => Err(self.shared.terminal_error()),
        }
    }

    /// Closes both directions.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

/// Sending half of a connection. Clones share the same write pump; dropping
/// every clone closes the connection.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Outgoing>,
    shared: Arc<Shared>,
}

impl Outbound {
    /// Queues `msg` and waits until it is written and flushed.
    ///
    /// Fails with the terminal error when the connection stopped before the
    /// message could be written.
    pub async fn send(&self, msg: Message) -> Result<(), ConnectionError> {
        let (done, ack) = oneshot::channel();
        if self.tx.send(Outgoing { msg, done }).await.is_err() {
            return Err(self.shared.terminal_error());
        }
        match ack.await {
            Ok(res) => res,
            Err(_) => Err(self.shared.terminal_error()),
        }
    }

    /// Closes both directions. Messages already queued are answered with an
    /// error instead of being written.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Resolves once the connection has stopped.
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};
    use transhift_protocol::{Packet, V1};

    use super::*;

    fn codec() -> Codec {
        Codec::new(&V1)
    }

    fn pair() -> ((Inbound, Outbound), (Inbound, Outbound)) {
        let (a, b) = tokio::io::duplex(1024);
        (open(a, codec()), open(b, codec()))
    }

    #[tokio::test]
    async fn messages_flow_both_ways_in_order() {
        let ((mut a_in, a_out), (mut b_in, b_out)) = pair();

        a_out.send(Message::bodiless(Packet::Ping)).await.unwrap();
        a_out.send(Message::file_size(42)).await.unwrap();
        b_out.send(Message::bodiless(Packet::Pong)).await.unwrap();

        assert_eq!(b_in.recv().await.unwrap().packet, Packet::Ping);
        assert_eq!(b_in.recv().await.unwrap().file_size_value().unwrap(), 42);
        assert_eq!(a_in.recv().await.unwrap().packet, Packet::Pong);
    }

    #[tokio::test]
    async fn directions_do_not_block_each_other() {
        let ((_a_in, a_out), (mut b_in, b_out)) = pair();

        // Nobody reads on side a; b can still receive.
        let b_writer = b_out.clone();
        let writer = tokio::spawn(async move {
            for i in 0..50u64 {
                let _ = b_writer.send(Message::file_size(i)).await;
            }
        });
        for i in 0..50u64 {
            a_out.send(Message::file_size(i)).await.unwrap();
            let msg = b_in.recv().await.unwrap();
            assert_eq!(msg.file_size_value().unwrap(), i);
        }
        writer.abort();
        drop(b_out);
    }

    #[tokio::test]
    async fn peer_close_ends_inbound_cleanly() {
        let ((mut a_in, a_out), (b_in, b_out)) = pair();

        b_out.send(Message::halt("bye")).await.unwrap();
        drop(b_in);
        drop(b_out);

        assert_eq!(a_in.recv().await.unwrap(), Message::halt("bye"));
        assert!(a_in.recv().await.unwrap_err().is_closed());

        // Outbound side of a is shut down as well.
        tokio::time::timeout(Duration::from_secs(2), a_out.closed())
            .await
            .expect("outbound should close");
        assert!(a_out.send(Message::bodiless(Packet::Ping)).await.is_err());
    }

    #[tokio::test]
    async fn explicit_close_releases_blocked_receiver() {
        let ((mut a_in, a_out), _b) = pair();

        let waiter = tokio::spawn(async move { a_in.recv().await });
        tokio::task::yield_now().await;
        a_out.close();

        let res = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("recv should be released")
            .unwrap();
        assert!(res.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn unknown_tag_is_terminal_for_both_directions() {
        let (mut raw, stream) = tokio::io::duplex(64);
        let (mut inbound, outbound) = open(stream, codec());

        raw.write_all(&[0xEE]).await.unwrap();

        assert!(matches!(
            inbound.recv().await,
            Err(ConnectionError::UnknownPacket(0xEE))
        ));
        assert!(matches!(
            outbound.send(Message::bodiless(Packet::Pong)).await,
            Err(ConnectionError::UnknownPacket(0xEE))
        ));
    }

    #[tokio::test]
    async fn dropping_inbound_closes_the_connection() {
        let (mut raw, stream) = tokio::io::duplex(64);
        let (inbound, outbound) = open(stream, codec());

        drop(inbound);
        tokio::time::timeout(Duration::from_secs(2), outbound.closed())
            .await
            .expect("should close");

        let mut buf = [0u8; 1];
        assert_eq!(raw.read(&mut buf).await.unwrap(), 0);
    }

    /// Stream whose reads fail; writes go to an inner duplex.
    struct FailingStream {
        inner: DuplexStream,
    }

    impl AsyncRead for FailingStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by test",
            )))
        }
    }

    impl AsyncWrite for FailingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn read_error_closes_both_flows() {
        let (_peer, inner) = tokio::io::duplex(64);
        let (mut inbound, outbound) = open(FailingStream { inner }, codec());

        match inbound.recv().await {
            Err(ConnectionError::Transport(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset)
            }
            other => panic!("expected transport error, got {other:?}"),
        }

        tokio::time::timeout(Duration::from_secs(2), outbound.closed())
            .await
            .expect("outbound should close");
        assert!(inbound.is_closed());
        assert!(matches!(
            outbound.send(Message::bodiless(Packet::Pong)).await,
            Err(ConnectionError::Transport(_))
        ));
    }
}
