//! Startup reconciliation.
//!
//! The segment files are the source of truth; the index is a cache of their
//! tails plus configuration. On startup, before any request is served:
//!
//! 1. Every indexed stream is checked against its segment file. A missing
//!    file drops the index entry; a tail that disagrees with the index
//!    (crash between fsync and index update, or a torn trailing frame) is
//!    rewritten from the file's ground truth.
//! 2. Directories under `streams/` with no index entry, including parked
//!    `...deleted~<ts>` directories whose async unlink never ran, are
//!    removed.

use std::collections::HashSet;
use std::path::Path;

use durastream_metadata::{MetaIndex, StreamDescriptor};
use tracing::{info, warn};

use crate::error::Result;
use crate::segment::Segment;

/// Counts reported by a recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Streams whose index entry already matched the file.
    pub recovered: usize,
    /// Streams whose offset was rewritten from the file.
    pub reconciled: usize,
    /// Index entries dropped because the segment file was gone.
    pub dropped: usize,
    /// Orphan directories removed from `streams/`.
    pub orphans_removed: usize,
}

/// Reconcile `index` against the segment files under `streams_dir`.
pub async fn run(index: &MetaIndex, streams_dir: &Path) -> Result<RecoverySummary> {
    let mut summary = RecoverySummary::default();
    let mut live_dirs: HashSet<String> = HashSet::new();

    for descriptor in index.list().await? {
        let segment = Segment::in_dir(&streams_dir.join(&descriptor.dir_name));

        let true_offset = match segment.scan_true_offset().await {
            Ok(offset) => offset,
            Err(crate::error::StoreError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(
                    path = %descriptor.path,
                    "segment file missing; dropping index entry"
                );
                index.delete(&descriptor.path).await?;
                summary.dropped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        live_dirs.insert(descriptor.dir_name.clone());

        if true_offset == descriptor.offset {
            summary.recovered += 1;
        } else {
            warn!(
                path = %descriptor.path,
                index_offset = %descriptor.offset,
                file_offset = %true_offset,
                "index offset disagrees with segment; file wins"
            );
            index
                .put(&StreamDescriptor {
                    offset: true_offset,
                    ..descriptor
                })
                .await?;
            summary.reconciled += 1;
        }
    }

    let mut entries = tokio::fs::read_dir(streams_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if live_dirs.contains(&name) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
            warn!(dir = %name, error = %e, "failed to remove orphan directory");
        } else {
            summary.orphans_removed += 1;
        }
    }

    info!(
        recovered = summary.recovered,
        reconciled = summary.reconciled,
        dropped = summary.dropped,
        orphans_removed = summary.orphans_removed,
        "startup recovery complete"
    );

    Ok(summary)
}
