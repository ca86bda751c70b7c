//! Error types for durastream-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid offset: {0:?}")]
    InvalidOffset(String),

    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
