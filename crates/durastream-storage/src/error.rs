//! Storage error taxonomy.
//!
//! These kinds are the contract with the HTTP layer: the server maps each
//! variant to a status code (400, 404, 409, 413, 500) and a short plain-text
//! body. Messages here therefore name streams by their URL path, never by
//! filesystem location.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input: bad offset/TTL/expiry, empty body, bad JSON,
    /// mutually exclusive expiry settings.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stream absent or expired.
    #[error("stream not found: {0}")]
    NotFound(String),

    /// PUT with different configuration, or POST with a different content
    /// type than the stream was created with.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// `Stream-Seq` did not exceed the last accepted sequence.
    #[error("sequence {seq:?} is not greater than last accepted {last:?}")]
    SeqConflict { seq: String, last: String },

    /// A single framed payload exceeded the frame size cap.
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("metadata error: {0}")]
    Metadata(#[from] durastream_metadata::MetadataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<durastream_core::Error> for StoreError {
    fn from(err: durastream_core::Error) -> Self {
        match err {
            durastream_core::Error::InvalidOffset(s) => {
                StoreError::InvalidArgument(format!("invalid offset: {s:?}"))
            }
            durastream_core::Error::FrameTooLarge { len, max } => {
                StoreError::FrameTooLarge { len, max }
            }
        }
    }
}
