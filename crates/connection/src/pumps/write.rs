//! Write pump: encodes queued messages one at a time.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use transhift_protocol::Codec;

use super::{Outgoing, Shared};
use crate::error::ConnectionError;

/// Writes queued messages in submission order.
///
/// Each message is encoded, written and flushed before its submitter is
/// acknowledged and the next message is taken. An in-progress write is never
/// abandoned; cancellation is only observed between messages. On exit, every
/// message still queued is answered with the terminal error and the write
/// side of the stream is shut down.
pub(crate) async fn write_pump<W>(
    mut writer: W,
    codec: Codec,
    mut outbound_rx: mpsc::Receiver<Outgoing>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            item = outbound_rx.recv() => match item {
                Some(item) => item,
                None => {
                    debug!("outbound handles dropped");
                    break;
                }
            },
        };

        frame.clear();
        let res = match codec.encode_into(&item.msg, &mut frame) {
            Ok(()) => write_frame(&mut writer, &frame).await,
            Err(e) => Err(e.into()),
        };

        match res {
            Ok(()) => {
                trace!(packet = %item.msg.packet, len = item.msg.body.len(), "frame sent");
                let _ = item.done.send(Ok(()));
            }
            Err(e) => {
                error!(packet = %item.msg.packet, "write error: {e}");
                shared.fail(e.clone());
                let _ = item.done.send(Err(e));
                break;
            }
        }
    }

    shared.cancel.cancel();

    outbound_rx.close();
    let err = shared.terminal_error();
    while let Ok(item) = outbound_rx.try_recv() {
        let _ = item.done.send(Err(err.clone()));
    }

    let _ = writer.shutdown().await;
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
