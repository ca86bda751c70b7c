//! Bounded pool of append handles.
//!
//! Keeping one append handle open per hot stream avoids an open/close pair
//! on every POST, but an unbounded map would leak file descriptors on a
//! server hosting many streams. The pool is an LRU keyed by stream path:
//! the least recently used handle is evicted (and closed once its last
//! borrower drops it) when capacity is reached, and a future append simply
//! reopens it.
//!
//! Callers must hold the store's per-stream write lock while using a handle;
//! the pool itself only guards its map.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use tokio::fs::{File, OpenOptions};
use tokio::sync::Mutex;

use crate::error::Result;

/// LRU of open append handles, keyed by stream path.
pub struct HandlePool {
    handles: Mutex<LruCache<String, Arc<Mutex<File>>>>,
}

impl HandlePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            handles: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the append handle for `path`, opening `segment_path` on a miss.
    ///
    /// The file is opened with OS append semantics, so every write lands at
    /// the current end of file regardless of interleaved reopens.
    pub async fn get_write(&self, path: &str, segment_path: &Path) -> Result<Arc<Mutex<File>>> {
        let mut handles = self.handles.lock().await;

        if let Some(handle) = handles.get(path) {
            return Ok(Arc::clone(handle));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(segment_path)
            .await?;
        let handle = Arc::new(Mutex::new(file));
        handles.push(path.to_string(), Arc::clone(&handle));

        Ok(handle)
    }

    /// Drop the handle for `path`, if pooled. Used on stream deletion so the
    /// descriptor does not pin a renamed directory.
    pub async fn remove(&self, path: &str) {
        self.handles.lock().await.pop(path);
    }

    /// Number of currently pooled handles (for monitoring and tests).
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn miss_opens_and_hit_reuses() {
        let dir = TempDir::new().unwrap();
        let pool = HandlePool::new(4);
        let seg = dir.path().join("000000.log");

        let a = pool.get_write("/s", &seg).await.unwrap();
        let b = pool.get_write("/s", &seg).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let pool = HandlePool::new(2);

        for name in ["a", "b", "c"] {
            let seg = dir.path().join(format!("{name}.log"));
            pool.get_write(name, &seg).await.unwrap();
        }
        assert_eq!(pool.len().await, 2);

        // "a" was evicted; reopening works transparently.
        let seg = dir.path().join("a.log");
        let handle = pool.get_write("a", &seg).await.unwrap();
        handle.lock().await.write_all(b"x").await.unwrap();
    }

    #[tokio::test]
    async fn evicted_handle_stays_usable_while_borrowed() {
        let dir = TempDir::new().unwrap();
        let pool = HandlePool::new(1);

        let seg_a = dir.path().join("a.log");
        let held = pool.get_write("a", &seg_a).await.unwrap();

        // Evict "a" from the pool while we still hold its Arc.
        let seg_b = dir.path().join("b.log");
        pool.get_write("b", &seg_b).await.unwrap();
        assert_eq!(pool.len().await, 1);

        let mut file = held.lock().await;
        file.write_all(b"still alive").await.unwrap();
        file.sync_all().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(&seg_a).unwrap(), b"still alive");
    }

    #[tokio::test]
    async fn remove_discards_the_handle() {
        let dir = TempDir::new().unwrap();
        let pool = HandlePool::new(4);
        let seg = dir.path().join("000000.log");

        pool.get_write("/s", &seg).await.unwrap();
        pool.remove("/s").await;
        assert_eq!(pool.len().await, 0);
    }
}
