//! Per-stream segment file.
//!
//! Each stream stores its messages in a single append-only file,
//! `000000.log`, inside the stream's directory. Writes go through the pooled
//! append handle held by the store; this module owns the read side and the
//! ground-truth scan used by recovery.
//!
//! Reads open an independent handle, seek to the requested byte offset, and
//! decode complete frames up to a byte limit (the committed tail). A torn
//! trailing frame is treated as absent, so a reader racing a crashed or
//! in-flight writer sees a clean prefix, never an error.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use durastream_core::frame::decode_frames;
use durastream_core::{Message, Offset};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::Result;

/// Name of the segment file inside a stream directory.
pub const SEGMENT_FILE: &str = "000000.log";

/// Read access to one stream's segment file.
#[derive(Debug, Clone)]
pub struct Segment {
    path: PathBuf,
}

impl Segment {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SEGMENT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the empty segment file and sync it to disk.
    pub async fn create(dir: &Path) -> Result<Self> {
        let segment = Self::in_dir(dir);
        let file = File::create(&segment.path).await?;
        file.sync_all().await?;
        Ok(segment)
    }

    /// Decode frames starting at `from`, reading at most `limit` bytes.
    ///
    /// Returns the messages (each tagged with its post-frame offset) and the
    /// position after the last complete frame.
    pub async fn read_from(&self, from: Offset, limit: u64) -> Result<(Vec<Message>, Offset)> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(from.byte_offset)).await?;

        let mut buf = Vec::new();
        file.take(limit).read_to_end(&mut buf).await?;

        Ok(decode_frames(&buf, from))
    }

    /// Scan the whole file and derive the ground-truth tail offset, ignoring
    /// any torn trailing frame.
    pub async fn scan_true_offset(&self) -> Result<Offset> {
        let (_, end) = self.read_from(Offset::ZERO, u64::MAX).await?;
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use durastream_core::frame::encode_frame;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn write_frames(dir: &Path, payloads: &[&[u8]]) {
        let mut buf = BytesMut::new();
        for p in payloads {
            encode_frame(&mut buf, p).unwrap();
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(SEGMENT_FILE))
            .await
            .unwrap();
        file.write_all(&buf).await.unwrap();
        file.sync_all().await.unwrap();
    }

    #[tokio::test]
    async fn create_then_scan_empty() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        assert_eq!(segment.scan_true_offset().await.unwrap(), Offset::ZERO);
    }

    #[tokio::test]
    async fn read_from_start() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        write_frames(dir.path(), &[b"hello", b"world"]).await;

        let (messages, end) = segment.read_from(Offset::ZERO, u64::MAX).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data.as_ref(), b"hello");
        assert_eq!(messages[0].offset, Offset::new(1, 10));
        assert_eq!(end, Offset::new(2, 20));
    }

    #[tokio::test]
    async fn read_from_middle() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        write_frames(dir.path(), &[b"hello", b"world"]).await;

        let (messages, end) = segment
            .read_from(Offset::new(1, 10), u64::MAX)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data.as_ref(), b"world");
        assert_eq!(end, Offset::new(2, 20));
    }

    #[tokio::test]
    async fn read_honors_byte_limit() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        write_frames(dir.path(), &[b"hello", b"world"]).await;

        // Limit covers only the first frame; the second is invisible.
        let (messages, end) = segment.read_from(Offset::ZERO, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(end, Offset::new(1, 10));
    }

    #[tokio::test]
    async fn read_past_eof_is_empty() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        write_frames(dir.path(), &[b"hello"]).await;

        let from = Offset::new(9, 900);
        let (messages, end) = segment.read_from(from, u64::MAX).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(end, from);
    }

    #[tokio::test]
    async fn scan_ignores_torn_tail() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(dir.path()).await.unwrap();
        write_frames(dir.path(), &[b"hello", b"world"]).await;

        // Chop the last frame in half, as a crash mid-write would.
        let path = dir.path().join(SEGMENT_FILE);
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(15).unwrap();

        assert_eq!(
            segment.scan_true_offset().await.unwrap(),
            Offset::new(1, 10)
        );
    }

    #[tokio::test]
    async fn read_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let segment = Segment::in_dir(dir.path());
        assert!(segment.read_from(Offset::ZERO, u64::MAX).await.is_err());
    }
}
