//! Storage configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the stream store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for all persistent state. The store creates `meta/`
    /// (index database) and `streams/` (segment directories) beneath it.
    pub data_dir: PathBuf,

    /// Maximum number of append handles kept open at once (default: 100).
    /// Evicted handles are reopened transparently on the next append.
    #[serde(default = "default_max_file_handles")]
    pub max_file_handles: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_file_handles: default_max_file_handles(),
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.data_dir.join("meta")
    }

    pub fn streams_dir(&self) -> PathBuf {
        self.data_dir.join("streams")
    }
}

fn default_max_file_handles() -> usize {
    100
}
