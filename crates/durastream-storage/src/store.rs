//! The stream store.
//!
//! [`StreamStore`] is the facade the HTTP layer talks to. It composes the
//! metadata index, the segment files, the append-handle pool, and the waiter
//! registry, and enforces the protocol's invariants:
//!
//! - offsets increase strictly monotonically per stream and are never reused;
//! - a message is observable iff its frame is written *and* fsynced *and*
//!   the index offset covers it;
//! - content type is immutable after creation;
//! - accepted `Stream-Seq` values are strictly increasing;
//! - a stream is observable iff indexed and not expired (expired streams are
//!   removed lazily on access and eagerly by the sweeper task).
//!
//! ## Concurrency
//!
//! Appends, creates, and deletes on one stream serialize through a per-path
//! async mutex. Reads take no lock: they snapshot the committed offset from
//! the index and read at most that many bytes from the segment, so they
//! observe a prefix of the committed log even while a writer is mid-append.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use durastream_core::frame::encode_frame;
use durastream_core::{Message, Offset};
use durastream_metadata::{normalize_content_type, MetaIndex, StreamDescriptor};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::handle_pool::HandlePool;
use crate::json;
use crate::path_encoding;
use crate::recovery;
use crate::segment::Segment;
use crate::waiters::WaiterRegistry;

/// Configuration supplied on stream creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_data: Option<Bytes>,
}

/// Outcome of a create call.
#[derive(Debug, Clone)]
pub struct Created {
    pub descriptor: StreamDescriptor,
    /// False when the stream already existed with identical configuration.
    pub newly_created: bool,
}

/// Result of reading from a stream.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub messages: Vec<Message>,
    /// Position for the client's next read.
    pub next_offset: Offset,
    /// Whether the read ended at the committed tail.
    pub up_to_date: bool,
}

type LockMap = parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Per-path facade over segments, handles, index, and waiters.
pub struct StreamStore {
    streams_dir: PathBuf,
    index: MetaIndex,
    handles: HandlePool,
    waiters: WaiterRegistry,
    write_locks: LockMap,
}

impl StreamStore {
    /// Open the store rooted at `config.data_dir`, running startup recovery
    /// before any request is served.
    pub async fn open(config: StoreConfig) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(config.meta_dir()).await?;
        tokio::fs::create_dir_all(config.streams_dir()).await?;

        let index = MetaIndex::open(config.meta_dir().join("index.db")).await?;
        recovery::run(&index, &config.streams_dir()).await?;

        Ok(Arc::new(Self {
            streams_dir: config.streams_dir(),
            index,
            handles: HandlePool::new(config.max_file_handles),
            waiters: WaiterRegistry::new(),
            write_locks: parking_lot::Mutex::new(HashMap::new()),
        }))
    }

    /// Create a stream, or succeed idempotently if it already exists with
    /// identical configuration.
    pub async fn create(&self, path: &str, options: CreateOptions) -> Result<Created> {
        if options.ttl_seconds.is_some() && options.expires_at.is_some() {
            return Err(StoreError::InvalidArgument(
                "TTL and absolute expiry are mutually exclusive".to_string(),
            ));
        }
        if options.ttl_seconds == Some(0) {
            return Err(StoreError::InvalidArgument(
                "TTL must be a positive number of seconds".to_string(),
            ));
        }

        let lock = self.write_lock(path);
        let _guard = lock.lock().await;

        if let Some(existing) = self.live_descriptor(path).await? {
            if configs_match(&existing, &options) {
                return Ok(Created {
                    descriptor: existing,
                    newly_created: false,
                });
            }
            return Err(StoreError::ConfigMismatch(format!(
                "stream {path} already exists with different configuration"
            )));
        }

        let created_at_ms = Utc::now().timestamp_millis();
        let dir_name = path_encoding::stream_dir_name(path, created_at_ms);
        let dir = self.streams_dir.join(&dir_name);
        tokio::fs::create_dir_all(&dir).await?;
        let segment = Segment::create(&dir).await?;

        let json_mode = options
            .content_type
            .as_deref()
            .is_some_and(|ct| normalize_content_type(ct) == "application/json");

        let mut offset = Offset::ZERO;
        if let Some(data) = options.initial_data.filter(|d| !d.is_empty()) {
            let payloads = json::split_payloads(&data, json_mode)?;
            offset = self
                .write_frames(path, segment.path(), offset, &payloads)
                .await?;
        }

        let descriptor = StreamDescriptor {
            path: path.to_string(),
            dir_name,
            content_type: options.content_type,
            offset,
            last_seq: None,
            ttl_seconds: options.ttl_seconds,
            expires_at: options.expires_at,
            created_at_ms,
        };
        self.index.put(&descriptor).await?;

        info!(path = %path, offset = %offset, "created stream");

        Ok(Created {
            descriptor,
            newly_created: true,
        })
    }

    /// Whether a live (indexed, unexpired) stream exists at `path`.
    pub async fn has(&self, path: &str) -> Result<bool> {
        Ok(self.live_descriptor(path).await?.is_some())
    }

    /// Descriptor of the live stream at `path`.
    pub async fn get(&self, path: &str) -> Result<StreamDescriptor> {
        self.live_descriptor(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    /// Delete the stream at `path`. Returns whether it existed.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let lock = self.write_lock(path);
        let _guard = lock.lock().await;

        match self.live_descriptor(path).await? {
            Some(descriptor) => {
                self.remove_entry(&descriptor).await?;
                info!(path = %path, "deleted stream");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Append `data` to the stream, returning the new tail offset.
    ///
    /// For JSON streams a top-level array is flattened one level into
    /// multiple frames. The frames are written and fsynced before the index
    /// commit, and waiters are woken only after the commit.
    pub async fn append(
        &self,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
        seq: Option<&str>,
    ) -> Result<Offset> {
        if data.is_empty() {
            return Err(StoreError::InvalidArgument(
                "append body must not be empty".to_string(),
            ));
        }

        let lock = self.write_lock(path);
        let _guard = lock.lock().await;

        let descriptor = self
            .live_descriptor(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if let (Some(posted), Some(expected)) = (content_type, descriptor.content_type.as_deref()) {
            if normalize_content_type(posted) != normalize_content_type(expected) {
                return Err(StoreError::ConfigMismatch(format!(
                    "content type {posted:?} does not match stream content type {expected:?}"
                )));
            }
        }

        if let Some(seq) = seq {
            if let Some(last) = descriptor.last_seq.as_deref() {
                if seq <= last {
                    return Err(StoreError::SeqConflict {
                        seq: seq.to_string(),
                        last: last.to_string(),
                    });
                }
            }
        }

        let payloads = json::split_payloads(&data, descriptor.is_json())?;
        let segment = Segment::in_dir(&self.streams_dir.join(&descriptor.dir_name));
        let new_offset = self
            .write_frames(path, segment.path(), descriptor.offset, &payloads)
            .await?;

        // Commit point: after this UPDATE the frames are observable.
        self.index.update_offset(path, new_offset, seq).await?;
        self.waiters.notify(path);

        debug!(path = %path, offset = %new_offset, frames = payloads.len(), "appended");

        Ok(new_offset)
    }

    /// Read committed messages whose post-position is greater than `from`.
    pub async fn read(&self, path: &str, from: Offset) -> Result<ReadResult> {
        let descriptor = self
            .live_descriptor(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let committed = descriptor.offset;
        if from.byte_offset >= committed.byte_offset {
            return Ok(ReadResult {
                messages: Vec::new(),
                next_offset: from,
                up_to_date: true,
            });
        }

        // Clamp to the committed tail so an in-flight (fsynced but not yet
        // committed) frame is never observed.
        let limit = committed.byte_offset - from.byte_offset;
        let segment = Segment::in_dir(&self.streams_dir.join(&descriptor.dir_name));
        let (messages, end) = segment.read_from(from, limit).await?;

        Ok(ReadResult {
            messages,
            next_offset: end,
            up_to_date: end.byte_offset >= committed.byte_offset,
        })
    }

    /// Read, blocking until messages past `from` are available or `timeout`
    /// elapses. On timeout the result is empty, up to date, and carries the
    /// caller's own offset back.
    ///
    /// Cancellation-safe: dropping the future releases the waiter
    /// registration.
    pub async fn wait_for_messages(
        &self,
        path: &str,
        from: Offset,
        timeout: Duration,
    ) -> Result<ReadResult> {
        let deadline = time::Instant::now() + timeout;

        loop {
            // Arm the wake before re-checking the tail; an append that
            // commits between the check and the await is then still seen.
            let handle = self.waiters.handle(path);
            let notified = handle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let result = self.read(path, from).await?;
            if !result.messages.is_empty() {
                return Ok(result);
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                return Ok(ReadResult {
                    messages: Vec::new(),
                    next_offset: from,
                    up_to_date: true,
                });
            }
            // Woken; loop to re-read. A spurious wake finds nothing and
            // parks again.
        }
    }

    /// Remove every expired stream. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for stale in self.index.list().await? {
            if !stale.is_expired(now) {
                continue;
            }

            let lock = self.write_lock(&stale.path);
            let _guard = lock.lock().await;

            // Re-check under the lock: the stream may have been deleted and
            // recreated since the listing.
            if let Some(current) = self.index.get(&stale.path).await? {
                if current.dir_name == stale.dir_name && current.is_expired(now) {
                    self.remove_entry(&current).await?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, "expired-stream sweep removed streams");
        }
        Ok(removed)
    }

    /// Spawn the background task that sweeps expired streams every
    /// `interval`.
    pub fn start_expiry_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    warn!(error = %e, "expired-stream sweep failed");
                }
            }
        })
    }

    /// Close the store's index. Pending segment handles close on drop.
    pub async fn close(&self) {
        self.index.close().await;
    }

    fn write_lock(&self, path: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.write_locks.lock();
        Arc::clone(
            locks
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Fetch the descriptor, removing the stream as a side effect when it
    /// has expired.
    async fn live_descriptor(&self, path: &str) -> Result<Option<StreamDescriptor>> {
        let Some(descriptor) = self.index.get(path).await? else {
            return Ok(None);
        };
        if descriptor.is_expired(Utc::now()) {
            info!(path = %path, "removing expired stream on access");
            self.remove_entry(&descriptor).await?;
            return Ok(None);
        }
        Ok(Some(descriptor))
    }

    /// Frame `payloads`, append them through the pooled handle, and fsync.
    async fn write_frames(
        &self,
        path: &str,
        segment_path: &std::path::Path,
        from: Offset,
        payloads: &[Bytes],
    ) -> Result<Offset> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(&mut buf, payload)?;
        }

        let handle = self.handles.get_write(path, segment_path).await?;
        let mut file = handle.lock().await;
        file.write_all(&buf).await?;
        file.sync_all().await?;

        Ok(from.advance(payloads.len() as u64, buf.len() as u64))
    }

    /// Drop the index entry, rename the directory aside, and unlink it
    /// asynchronously. Waiters are woken so they observe the deletion.
    async fn remove_entry(&self, descriptor: &StreamDescriptor) -> Result<()> {
        self.index.delete(&descriptor.path).await?;
        self.handles.remove(&descriptor.path).await;

        let dir = self.streams_dir.join(&descriptor.dir_name);
        let parked = self.streams_dir.join(path_encoding::deleted_dir_name(
            &descriptor.dir_name,
            Utc::now().timestamp_millis(),
        ));
        match tokio::fs::rename(&dir, &parked).await {
            Ok(()) => {
                tokio::spawn(async move {
                    if let Err(e) = tokio::fs::remove_dir_all(&parked).await {
                        warn!(error = %e, "failed to unlink deleted stream directory");
                    }
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "failed to park deleted stream directory"),
        }

        self.waiters.notify_and_remove(&descriptor.path);
        Ok(())
    }
}

fn configs_match(existing: &StreamDescriptor, options: &CreateOptions) -> bool {
    let existing_ct = existing.content_type.as_deref().map(normalize_content_type);
    let new_ct = options.content_type.as_deref().map(normalize_content_type);

    existing_ct == new_ct
        && existing.ttl_seconds == options.ttl_seconds
        && existing.expires_at.map(|t| t.timestamp_millis())
            == options.expires_at.map(|t| t.timestamp_millis())
}
