//! Per-path wake fabric for blocked readers.
//!
//! A long-poll or SSE reader that has caught up to the tail parks on the
//! [`tokio::sync::Notify`] for its stream path. A committed append calls
//! [`WaiterRegistry::notify`], which wakes every currently parked waiter for
//! that path exactly once; each waiter then re-reads from its offset. A
//! spurious wake is harmless (the re-read finds nothing and the waiter parks
//! again), so the fabric only has to promise "at least once".
//!
//! The lost-wakeup race is closed on the waiter side: callers must obtain
//! the notified future and enable it *before* re-checking the tail, the
//! pattern `StreamStore::wait_for_messages` follows.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Registry of per-path wake handles.
#[derive(Default)]
pub struct WaiterRegistry {
    paths: Mutex<HashMap<String, Arc<Notify>>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wake handle for `path`, created on first use.
    pub fn handle(&self, path: &str) -> Arc<Notify> {
        let mut paths = self.paths.lock();
        Arc::clone(
            paths
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Wake all waiters currently parked on `path`.
    pub fn notify(&self, path: &str) {
        let handle = {
            let paths = self.paths.lock();
            paths.get(path).cloned()
        };
        if let Some(handle) = handle {
            handle.notify_waiters();
        }
    }

    /// Wake all waiters for `path` and drop its entry. Used when the stream
    /// is deleted: woken waiters re-read, find the stream gone, and return
    /// not-found to their clients.
    pub fn notify_and_remove(&self, path: &str) {
        let handle = self.paths.lock().remove(path);
        if let Some(handle) = handle {
            handle.notify_waiters();
        }
    }

    /// Number of registered paths (for tests).
    pub fn path_count(&self) -> usize {
        self.paths.lock().len()
    }
}
