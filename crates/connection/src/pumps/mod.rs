pub(crate) mod read;
pub(crate) mod write;

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use transhift_protocol::Message;

use crate::error::ConnectionError;

/// A message handed to the write pump together with its completion signal.
pub(crate) struct Outgoing {
    pub(crate) msg: Message,
    pub(crate) done: oneshot::Sender<Result<(), ConnectionError>>,
}

/// State shared by both pumps and both handles of one connection.
pub(crate) struct Shared {
    pub(crate) cancel: CancellationToken,
    error: Mutex<Option<ConnectionError>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            error: Mutex::new(None),
        }
    }

    /// Records `err` unless an earlier error was recorded, then shuts both
    /// pumps down.
    pub(crate) fn fail(&self, err: ConnectionError) {
        {
            let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.cancel.cancel();
    }

    /// The first recorded error, or `Closed` when the connection ended cleanly.
    pub(crate) fn terminal_error(&self) -> ConnectionError {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(ConnectionError::Closed)
    }
}
