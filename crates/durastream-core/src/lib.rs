//! Core types for durastream
//!
//! This crate holds the vocabulary types every other crate speaks:
//!
//! - [`Offset`]: the `(readSeq, byteOffset)` position token with its canonical
//!   textual form (`0000000000000003_0000000000000142`).
//! - The frame codec in [`frame`]: the on-disk encoding of one message
//!   (`u32` big-endian length, payload, trailing newline) and the tolerant
//!   decoder that stops at a torn trailing frame instead of erroring.
//!
//! Nothing here touches the filesystem or the network; segment I/O lives in
//! `durastream-storage` and the HTTP surface in `durastream-server`.

pub mod error;
pub mod frame;
pub mod offset;

pub use error::{Error, Result};
pub use frame::{Message, FRAME_OVERHEAD, MAX_FRAME_LEN};
pub use offset::Offset;
