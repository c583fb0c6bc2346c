//! UID-keyed registry of downloaders waiting for an uploader.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, trace};

use transhift_protocol::Uid;

use crate::error::NotFoundError;

struct Entry<H> {
    handle: H,
    registered_at: Instant,
}

/// Pending downloaders keyed by the UID handed to them.
///
/// Every operation runs under one lock and entries are moved out on claim,
/// so a UID can be claimed at most once and no caller keeps a reference into
/// the table.
pub struct RendezvousTable<H> {
    entries: Mutex<HashMap<Uid, Entry<H>>>,
}

impl<H> Default for RendezvousTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RendezvousTable<H> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `handle` under a fresh random UID.
    pub fn register(&self, handle: H) -> Uid {
        self.register_with(handle, Uid::random)
    }

    /// Stores `handle` under the first generated UID not already pending.
    pub fn register_with(&self, handle: H, mut generate: impl FnMut() -> Uid) -> Uid {
        let mut entries = self.lock();
        let uid = loop {
            let uid = generate();
            if !entries.contains_key(&uid) {
                break uid;
            }
            trace!(%uid, "uid collision, regenerating");
        };
        entries.insert(
            uid,
            Entry {
                handle,
                registered_at: Instant::now(),
            },
        );
        debug!(%uid, pending = entries.len(), "downloader registered");
        uid
    }

    /// Removes and returns the handle registered under `uid`.
    pub fn claim(&self, uid: &Uid) -> Result<H, NotFoundError> {
        let entry = self.lock().remove(uid).ok_or(NotFoundError(*uid))?;
        debug!(%uid, waited = ?entry.registered_at.elapsed(), "downloader claimed");
        Ok(entry.handle)
    }

    /// Drops the entry for `uid` if it is still pending. Returns whether an
    /// entry was removed.
    pub fn unregister(&self, uid: &Uid) -> bool {
        let removed = self.lock().remove(uid).is_some();
        if removed {
            debug!(%uid, "downloader unregistered");
        }
        removed
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.lock().contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uid, Entry<H>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
