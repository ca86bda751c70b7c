//! File-backed storage engine for durastream
//!
//! This crate owns everything between the HTTP handlers and the disk:
//!
//! - [`segment`]: the per-stream append-only `000000.log` file and its
//!   tolerant frame decoder.
//! - [`handle_pool`]: a bounded LRU of open append handles so a busy server
//!   does not exhaust file descriptors.
//! - [`waiters`]: the per-path wake fabric that turns a committed append into
//!   the prompt release of blocked long-poll and SSE readers.
//! - [`recovery`]: startup reconciliation of the metadata index against the
//!   segment files. The file is the source of truth.
//! - [`store`]: the [`StreamStore`] facade composing all of the above and
//!   enforcing the protocol's invariants (strictly monotonic offsets,
//!   immutable content types, fsync-before-commit, lazy expiry).
//!
//! ## Durability contract
//!
//! Every append is `write()` then `fsync()` on the segment file *before* the
//! index update and the waiter wake. An offset visible in the index is
//! durable on disk; readers never observe a frame that could vanish in a
//! crash.

pub mod config;
pub mod error;
pub mod handle_pool;
pub mod json;
pub mod path_encoding;
pub mod recovery;
pub mod segment;
pub mod store;
pub mod waiters;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{CreateOptions, Created, ReadResult, StreamStore};
