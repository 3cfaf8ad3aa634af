//! Table of in-flight calls awaiting a response from the subprocess.
//!
//! Every entry is removed exactly once: by [`PendingCalls::complete`] when the
//! matching response arrives, by [`PendingCalls::fail_all`] when the
//! subprocess dies, or by the caller's [`PendingGuard`] when the call times
//! out or its future is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::BridgeError;

/// What a waiting caller receives: the full response object, or an error.
pub type Reply = std::result::Result<Value, BridgeError>;

#[derive(Debug)]
struct Entry {
    tx: oneshot::Sender<Reply>,
    method: String,
    since: Instant,
}

/// In-flight calls keyed by request id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    entries: Mutex<HashMap<u64, Entry>>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a call before its request is written.
    ///
    /// The returned guard removes the entry when dropped, so a caller that
    /// stops waiting never leaves a stale entry behind.
    pub fn register(
        self: &Arc<Self>,
        id: u64,
        method: impl Into<String>,
    ) -> (PendingGuard, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let entry = Entry {
            tx,
            method: method.into(),
            since: Instant::now(),
        };
        if self.entries.lock().insert(id, entry).is_some() {
            tracing::warn!(id, "replaced an existing pending call with the same id");
        }
        let guard = PendingGuard {
            calls: Arc::clone(self),
            id,
        };
        (guard, rx)
    }

    /// Deliver a response to the caller waiting on `id`.
    ///
    /// Returns `false` if nobody is waiting (unknown, stale or late id).
    pub fn complete(&self, id: u64, response: Value) -> bool {
        let Some(entry) = self.entries.lock().remove(&id) else {
            return false;
        };
        tracing::trace!(
            id,
            method = %entry.method,
            elapsed_ms = entry.since.elapsed().as_millis() as u64,
            "response delivered"
        );
        // The receiver may have been dropped between removal and send.
        entry.tx.send(Ok(response)).is_ok()
    }

    /// Reject every outstanding call with an error built by `make_err`.
    ///
    /// Returns the number of calls rejected.
    pub fn fail_all(&self, make_err: impl Fn() -> BridgeError) -> usize {
        let drained: Vec<(u64, Entry)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            tracing::debug!(id, method = %entry.method, "rejecting pending call");
            let _ = entry.tx.send(Err(make_err()));
        }
        count
    }

    /// Remove an entry without completing it.
    pub fn remove(&self, id: u64) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Whether a call with `id` is waiting.
    pub fn contains(&self, id: u64) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of calls waiting.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no calls are waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Removes its pending entry on drop.
#[derive(Debug)]
pub struct PendingGuard {
    calls: Arc<PendingCalls>,
    id: u64,
}

impl PendingGuard {
    /// The request id this guard covers.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.calls.remove(self.id) {
            tracing::trace!(id = self.id, "pending call abandoned");
        }
    }
}
