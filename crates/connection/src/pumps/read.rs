//! Read pump: decodes frames and hands them to the inbound channel.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use transhift_protocol::{Codec, Message};

use super::Shared;

/// Decodes frames from `reader` in arrival order until the stream ends,
/// a frame cannot be decoded, or the connection is cancelled.
///
/// A decode failure is recorded as the connection's terminal error. Either
/// way, exiting cancels the shared token so the write pump stops too.
pub(crate) async fn read_pump<R>(
    mut reader: R,
    codec: Codec,
    inbound_tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            res = codec.decode(&mut reader) => match res {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!("peer closed the stream");
                    break;
                }
                Err(e) => {
                    warn!("read error: {e}");
                    shared.fail(e.into());
                    break;
                }
            },
        };

        trace!(packet = %msg.packet, len = msg.body.len(), "frame received");

        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            res = inbound_tx.send(msg) => {
                if res.is_err() {
                    debug!("inbound handle dropped");
                    break;
                }
            }
        }
    }

    shared.cancel.cancel();
}
