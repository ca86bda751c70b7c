//! Crash-recovery tests: kill the store at awkward moments, restart, and
//! check that readers only ever see a clean prefix of what was appended.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use durastream_core::Offset;
use durastream_storage::segment::SEGMENT_FILE;
use durastream_storage::{CreateOptions, StoreConfig, StreamStore};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> Arc<StreamStore> {
    StreamStore::open(StoreConfig::new(dir.path())).await.unwrap()
}

fn text_options() -> CreateOptions {
    CreateOptions {
        content_type: Some("text/plain".to_string()),
        ..Default::default()
    }
}

/// Path of the only stream directory under `data/streams`.
fn only_stream_dir(data_dir: &TempDir) -> PathBuf {
    let streams = data_dir.path().join("streams");
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&streams)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs.len(), 1, "expected exactly one stream directory");
    dirs.pop().unwrap()
}

#[tokio::test]
async fn torn_final_frame_is_rolled_back() {
    let dir = TempDir::new().unwrap();

    {
        let store = open_store(&dir).await;
        store.create("/s", text_options()).await.unwrap();
        for payload in [&b"one"[..], b"two", b"three"] {
            store
                .append("/s", Bytes::copy_from_slice(payload), None, None)
                .await
                .unwrap();
        }
        store.close().await;
    }

    // Each 3/5-byte payload costs payload + 5 bytes; chop into the last frame.
    let segment = only_stream_dir(&dir).join(SEGMENT_FILE);
    let len = std::fs::metadata(&segment).unwrap().len();
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&segment)
        .unwrap();
    file.set_len(len - 3).unwrap();

    let store = open_store(&dir).await;

    // Index reconciled to the two complete frames.
    let descriptor = store.get("/s").await.unwrap();
    assert_eq!(descriptor.offset.read_seq, 2);

    let result = store.read("/s", Offset::ZERO).await.unwrap();
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.messages[0].data.as_ref(), b"one");
    assert_eq!(result.messages[1].data.as_ref(), b"two");
    assert!(result.up_to_date);

    // The next append takes the rolled-back slot.
    let offset = store
        .append("/s", Bytes::from_static(b"three-again"), None, None)
        .await
        .unwrap();
    assert_eq!(offset.read_seq, 3);
}

#[tokio::test]
async fn fsynced_but_uncommitted_frames_are_adopted() {
    let dir = TempDir::new().unwrap();

    {
        let store = open_store(&dir).await;
        store.create("/s", text_options()).await.unwrap();
        store
            .append("/s", Bytes::from_static(b"hello"), None, None)
            .await
            .unwrap();
        store.close().await;
    }

    // Simulate a crash between fsync and the index update: a complete frame
    // on disk that the index does not know about.
    let segment = only_stream_dir(&dir).join(SEGMENT_FILE);
    let mut raw = std::fs::read(&segment).unwrap();
    raw.extend_from_slice(b"\x00\x00\x00\x05world\n");
    std::fs::write(&segment, &raw).unwrap();

    let store = open_store(&dir).await;

    // The file wins: the orphaned frame becomes visible.
    let descriptor = store.get("/s").await.unwrap();
    assert_eq!(descriptor.offset, Offset::new(2, 20));

    let result = store.read("/s", Offset::ZERO).await.unwrap();
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.messages[1].data.as_ref(), b"world");
}

#[tokio::test]
async fn missing_segment_drops_the_stream() {
    let dir = TempDir::new().unwrap();

    {
        let store = open_store(&dir).await;
        store.create("/s", text_options()).await.unwrap();
        store.close().await;
    }

    std::fs::remove_dir_all(only_stream_dir(&dir)).unwrap();

    let store = open_store(&dir).await;
    assert!(!store.has("/s").await.unwrap());
}

#[tokio::test]
async fn orphan_and_parked_directories_are_removed() {
    let dir = TempDir::new().unwrap();

    {
        let store = open_store(&dir).await;
        store.create("/kept", text_options()).await.unwrap();
        store.close().await;
    }

    let streams = dir.path().join("streams");
    let orphan = streams.join("b3JwaGFu~1700000000000~00000000deadbeef");
    std::fs::create_dir_all(&orphan).unwrap();
    std::fs::write(orphan.join(SEGMENT_FILE), b"").unwrap();
    let parked = streams.join("Z29uZQ~1700000000000~00c0ffee.deleted~1700000001000");
    std::fs::create_dir_all(&parked).unwrap();

    let store = open_store(&dir).await;

    assert!(store.has("/kept").await.unwrap());
    assert!(!orphan.exists());
    assert!(!parked.exists());

    let remaining: Vec<_> = std::fs::read_dir(&streams)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn clean_restart_preserves_everything() {
    let dir = TempDir::new().unwrap();

    let tail = {
        let store = open_store(&dir).await;
        store.create("/s", text_options()).await.unwrap();
        let tail = store
            .append("/s", Bytes::from_static(b"durable"), None, Some("a"))
            .await
            .unwrap();
        store.close().await;
        tail
    };

    let store = open_store(&dir).await;
    let descriptor = store.get("/s").await.unwrap();
    assert_eq!(descriptor.offset, tail);
    assert_eq!(descriptor.last_seq.as_deref(), Some("a"));

    let result = store.read("/s", Offset::ZERO).await.unwrap();
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].data.as_ref(), b"durable");
}
