//! durastream HTTP server
//!
//! An HTTP-native append-only log service. Clients create named streams,
//! append opaque bytes or JSON items, and read from any offset with optional
//! live tailing (long-poll or SSE). The protocol is plain HTTP with explicit
//! offset headers, so CDNs and ordinary HTTP caches can serve historical
//! ranges and collapse concurrent live readers.
//!
//! # Protocol sketch
//!
//! ```text
//! PUT /v1/stream/orders            create (Content-Type, Stream-TTL, ...)
//! POST /v1/stream/orders           append, returns Stream-Next-Offset
//! GET /v1/stream/orders?offset=-1  catch-up read from the start
//! GET ...?offset=X&live=long-poll  block until data after X, or 204
//! GET ...?offset=X&live=sse        text/event-stream tail
//! HEAD /v1/stream/orders           metadata probe
//! DELETE /v1/stream/orders         delete
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use durastream_server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     durastream_server::run(config).await
//! }
//! ```

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, head, post, put};
use axum::Router;
use durastream_storage::{StoreConfig, StreamStore};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod cursor;
pub mod handlers;

pub use config::ServerConfig;
pub use cursor::CursorClock;

/// Shared state handed to every handler. Built once at startup; no
/// process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StreamStore>,
    pub cursor: CursorClock,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<StreamStore>, config: ServerConfig) -> Self {
        let cursor = CursorClock::new(config.cursor_interval, config.cursor_epoch);
        Self {
            store,
            cursor,
            config: Arc::new(config),
        }
    }
}

/// Build the router serving the stream protocol under `/v1/stream/`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    // Bodies are capped a little above the frame limit so an oversize
    // append fails with 413 rather than an opaque connection error.
    let body_limit =
        axum::extract::DefaultBodyLimit::max(durastream_core::MAX_FRAME_LEN + 1024);

    Router::new()
        .route("/v1/stream/{*path}", put(handlers::create_stream))
        .route("/v1/stream/{*path}", head(handlers::head_stream))
        .route("/v1/stream/{*path}", get(handlers::read_stream))
        .route("/v1/stream/{*path}", post(handlers::append_stream))
        .route("/v1/stream/{*path}", delete(handlers::delete_stream))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Open the store, start the expiry sweeper, and serve until shutdown.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store_config = StoreConfig {
        data_dir: config.data_dir.clone(),
        max_file_handles: config.max_file_handles,
    };
    let store = StreamStore::open(store_config).await?;

    let sweeper = Arc::clone(&store).start_expiry_sweeper(config.cleanup_interval);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, data_dir = %config.data_dir.display(), "durastream server listening");

    let state = AppState::new(Arc::clone(&store), config);
    let router = create_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    store.close().await;
    tracing::info!("durastream server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
