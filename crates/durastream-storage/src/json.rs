//! JSON content mode.
//!
//! Streams created with content type `application/json` frame their data per
//! JSON value rather than per request body:
//!
//! - A top-level array is flattened exactly one level; each element becomes
//!   one frame. Empty arrays are rejected (they would commit an append that
//!   no reader can observe).
//! - Any other JSON value is stored as a single frame, byte-for-byte as the
//!   client sent it.
//! - Bodies that are not valid JSON are rejected outright.
//!
//! On the read side the handler returns a JSON array of the selected
//! messages, so `POST [1,2,3]` followed by a full read yields `[1,2,3]`
//! again, with three individually addressable messages in between.

use bytes::Bytes;
use durastream_core::Message;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Split an append body into the payloads to frame.
pub fn split_payloads(data: &Bytes, json_mode: bool) -> Result<Vec<Bytes>> {
    if !json_mode {
        return Ok(vec![data.clone()]);
    }

    let value: Value = serde_json::from_slice(data)
        .map_err(|e| StoreError::InvalidArgument(format!("invalid JSON body: {e}")))?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(StoreError::InvalidArgument(
                    "empty JSON array cannot be appended".to_string(),
                ));
            }
            items
                .into_iter()
                .map(|item| {
                    serde_json::to_vec(&item)
                        .map(Bytes::from)
                        .map_err(|e| StoreError::InvalidArgument(e.to_string()))
                })
                .collect()
        }
        // A single value keeps the client's own bytes, whitespace and all.
        _ => Ok(vec![data.clone()]),
    }
}

/// Assemble a read response body for a JSON stream: the selected messages
/// joined by commas inside one array.
pub fn join_json_array(messages: &[Message]) -> Vec<u8> {
    let total: usize = messages.iter().map(|m| m.data.len() + 1).sum();
    let mut body = Vec::with_capacity(total + 2);
    body.push(b'[');
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            body.push(b',');
        }
        body.extend_from_slice(&message.data);
    }
    body.push(b']');
    body
}
