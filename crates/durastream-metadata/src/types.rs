//! Stream descriptor types.

use chrono::{DateTime, TimeZone, Utc};
use durastream_core::Offset;
use serde::{Deserialize, Serialize};

/// Everything the index knows about one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// URL path identifying the stream (e.g. `/orders/events`).
    pub path: String,

    /// On-disk directory name under `streams/`. Unique per creation, so a
    /// delete-and-recreate at the same path never collides with a directory
    /// still awaiting async removal.
    pub dir_name: String,

    /// MIME type fixed at creation. Immutable for the stream's lifetime.
    pub content_type: Option<String>,

    /// Committed tail position. Messages at or below this offset are
    /// durable and observable.
    pub offset: Offset,

    /// Last accepted `Stream-Seq` value; later appends must exceed it.
    pub last_seq: Option<String>,

    /// Relative time-to-live in seconds, counted from creation.
    pub ttl_seconds: Option<u64>,

    /// Absolute expiry instant. Mutually exclusive with `ttl_seconds`.
    pub expires_at: Option<DateTime<Utc>>,

    /// Creation instant, milliseconds since the Unix epoch.
    pub created_at_ms: i64,
}

impl StreamDescriptor {
    /// The instant this stream expires, if it expires at all.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(at) = self.expires_at {
            return Some(at);
        }
        self.ttl_seconds.map(|ttl| {
            Utc.timestamp_millis_opt(self.created_at_ms + ttl as i64 * 1000)
                .single()
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|at| now >= at)
    }

    /// Streams with content type `application/json` get JSON framing:
    /// appended arrays are flattened one level and reads are wrapped in
    /// an array.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| normalize_content_type(ct) == "application/json")
    }

    /// Whether the content type is safe to emit over SSE (textual or JSON).
    pub fn is_textual(&self) -> bool {
        self.content_type
            .as_deref()
            .map(normalize_content_type)
            .is_some_and(|ct| ct.starts_with("text/") || ct == "application/json")
    }
}

/// Strip parameters (`; charset=...`) from a content type before comparing.
pub fn normalize_content_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}
