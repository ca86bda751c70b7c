//! Server configuration.
//!
//! All options can be set through `DURASTREAM_*` environment variables; see
//! [`ServerConfig::from_env`]. Durations that shape client-visible behavior
//! (long-poll timeout, SSE reconnect) default to the protocol's recommended
//! values.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Epoch the cursor clock counts intervals from.
pub const DEFAULT_CURSOR_EPOCH: &str = "2025-12-19T00:00:00Z";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Root directory for segments and the metadata index.
    pub data_dir: PathBuf,
    /// Maximum number of open append handles.
    pub max_file_handles: usize,
    /// How long a long-poll read blocks before returning 204.
    pub long_poll_timeout: Duration,
    /// How long an SSE connection lives before the server closes it so the
    /// client reconnects with its latest offset.
    pub sse_reconnect_interval: Duration,
    /// Width of one cursor interval.
    pub cursor_interval: Duration,
    /// Epoch for cursor interval counting.
    pub cursor_epoch: DateTime<Utc>,
    /// Cadence of the expired-stream sweeper.
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4437,
            data_dir: PathBuf::from("./data"),
            max_file_handles: 100,
            long_poll_timeout: Duration::from_secs(30),
            sse_reconnect_interval: Duration::from_secs(60),
            cursor_interval: Duration::from_secs(20),
            cursor_epoch: default_cursor_epoch(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Build a config from `DURASTREAM_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("DURASTREAM_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("DURASTREAM_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(dir) = std::env::var("DURASTREAM_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(handles) = std::env::var("DURASTREAM_MAX_FILE_HANDLES") {
            config.max_file_handles = handles.parse()?;
        }
        if let Ok(ms) = std::env::var("DURASTREAM_LONG_POLL_TIMEOUT_MS") {
            config.long_poll_timeout = Duration::from_millis(ms.parse()?);
        }
        if let Ok(secs) = std::env::var("DURASTREAM_SSE_RECONNECT_SECS") {
            config.sse_reconnect_interval = Duration::from_secs(secs.parse()?);
        }
        if let Ok(secs) = std::env::var("DURASTREAM_CURSOR_INTERVAL_SECS") {
            config.cursor_interval = Duration::from_secs(secs.parse()?);
        }
        if let Ok(epoch) = std::env::var("DURASTREAM_CURSOR_EPOCH") {
            config.cursor_epoch = DateTime::parse_from_rfc3339(&epoch)?.with_timezone(&Utc);
        }
        if let Ok(secs) = std::env::var("DURASTREAM_CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(secs.parse()?);
        }

        Ok(config)
    }
}

fn default_cursor_epoch() -> DateTime<Utc> {
    // The constant is well-formed; a parse failure here is a build defect.
    DateTime::parse_from_rfc3339(DEFAULT_CURSOR_EPOCH)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}
