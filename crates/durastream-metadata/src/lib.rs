//! Stream descriptor index
//!
//! This crate tracks every live stream: its content type, its committed
//! offset, the last accepted writer sequence, and its expiry configuration.
//! Segment files on disk hold the data; this index is the "brain" that knows
//! which streams exist and where their tails are.
//!
//! ## Why SQLite?
//!
//! The index must survive crashes with each key either fully updated or not
//! at all, because startup recovery reconciles it against the segment files.
//! An embedded SQLite database gives exactly that: atomic single-row writes,
//! zero configuration, and comfortable headroom for a per-path lookup on
//! every request.
//!
//! ## Commit point
//!
//! The append path writes and fsyncs the segment frame first, then calls
//! [`MetaIndex::update_offset`]. That single UPDATE is the commit point: a
//! message is observable iff the index offset covers it. A crash between
//! fsync and UPDATE leaves durable-but-uncommitted bytes, which recovery
//! re-adopts from the file (the file is the source of truth).

pub mod error;
pub mod index;
pub mod types;

pub use error::{MetadataError, Result};
pub use index::MetaIndex;
pub use types::{normalize_content_type, StreamDescriptor};
