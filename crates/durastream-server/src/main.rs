//! durastream server binary.
//!
//! Configuration is taken from `DURASTREAM_*` environment variables:
//!
//! - `DURASTREAM_HOST` / `DURASTREAM_PORT` - bind address (default
//!   `0.0.0.0:4437`)
//! - `DURASTREAM_DATA_DIR` - data directory (default `./data`)
//! - `DURASTREAM_MAX_FILE_HANDLES` - append-handle pool size (default 100)
//! - `DURASTREAM_LONG_POLL_TIMEOUT_MS` - long-poll timeout (default 30000)
//! - `DURASTREAM_SSE_RECONNECT_SECS` - SSE connection lifetime (default 60)
//! - `DURASTREAM_CURSOR_INTERVAL_SECS` - cursor interval (default 20)
//! - `DURASTREAM_CURSOR_EPOCH` - cursor epoch, RFC3339
//! - `DURASTREAM_CLEANUP_INTERVAL_SECS` - expiry sweep cadence (default 60)
//!
//! Logging is controlled via `RUST_LOG` (default `info`).

use durastream_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    durastream_server::run(config).await
}
