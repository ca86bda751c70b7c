//! On-disk frame codec.
//!
//! Each message is stored in the segment file as:
//!
//! ```text
//! ┌──────────────┬───────────┬──────────┐
//! │ Length       │ Payload   │ Newline  │
//! │ (4 bytes BE) │ (N bytes) │ (0x0A)   │
//! └──────────────┴───────────┴──────────┘
//! ```
//!
//! The trailing newline is framing redundancy: a frame whose length prefix
//! and payload are on disk but whose newline is missing was torn by a crash
//! mid-write, and the decoder treats it (and anything after it) as absent.
//! Decoding therefore never fails on a truncated file; it returns the clean
//! prefix, which is exactly what recovery and concurrent readers want.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::offset::Offset;

/// Fixed cost of one frame beyond its payload: length prefix + newline.
pub const FRAME_OVERHEAD: usize = 5;

/// Maximum payload length of a single frame (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const NEWLINE: u8 = 0x0A;

/// One decoded message and the stream position after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub data: Bytes,
    /// Position after this message's frame.
    pub offset: Offset,
}

/// Append one frame to `buf`.
pub fn encode_frame(buf: &mut BytesMut, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    buf.reserve(payload.len() + FRAME_OVERHEAD);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.put_u8(NEWLINE);
    Ok(())
}

/// Total encoded size of a frame carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    payload_len + FRAME_OVERHEAD
}

/// Decode every complete frame in `buf`, which starts at stream position
/// `start`.
///
/// Returns the decoded messages and the position after the last complete
/// frame. A partial trailing frame (length prefix cut short, payload cut
/// short, or missing newline) is silently ignored.
pub fn decode_frames(buf: &[u8], start: Offset) -> (Vec<Message>, Offset) {
    let mut messages = Vec::new();
    let mut pos = 0usize;
    let mut offset = start;

    loop {
        let rest = &buf[pos..];
        if rest.len() < 4 {
            break;
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if rest.len() < total {
            break;
        }
        if rest[total - 1] != NEWLINE {
            // Torn frame: the length and payload made it to disk but the
            // terminator did not. Everything from here on is suspect.
            break;
        }

        offset = offset.advance(1, total as u64);
        messages.push(Message {
            data: Bytes::copy_from_slice(&rest[4..4 + len]),
            offset,
        });
        pos += total;
    }

    (messages, offset)
}
