//! Filesystem-safe names for stream directories.
//!
//! A stream's URL path is base64url-encoded so it can name a directory.
//! Paths whose encoding would blow past sane filename limits are truncated
//! and disambiguated with a SHA-256 suffix. The full directory name appends
//! the creation time and a random suffix:
//!
//! ```text
//! <encoded-path>~<created-millis>~<random-hex>
//! ```
//!
//! Uniqueness per creation is what makes deletion safe: the directory of a
//! deleted stream is renamed aside and unlinked asynchronously while a new
//! stream at the same path gets a fresh directory.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Longest encoded path we will use verbatim.
const MAX_ENCODED_LEN: usize = 200;
/// Truncation point, leaving room for the hash suffix.
const TRUNCATED_LEN: usize = 180;
/// Hex characters of hash kept for truncated names.
const HASH_SUFFIX_LEN: usize = 16;

/// Marker inserted into a directory name when its stream is deleted.
pub const DELETED_MARKER: &str = ".deleted~";

/// Encode a stream path as a filesystem-safe component.
pub fn encode_path(path: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(path.as_bytes());
    if encoded.len() <= MAX_ENCODED_LEN {
        return encoded;
    }

    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}~{}", &encoded[..TRUNCATED_LEN], &digest[..HASH_SUFFIX_LEN])
}

/// Generate a fresh, unique directory name for a stream created now.
pub fn stream_dir_name(path: &str, created_at_ms: i64) -> String {
    let random: u64 = rand::random();
    format!("{}~{}~{:016x}", encode_path(path), created_at_ms, random)
}

/// The name a stream directory is renamed to when its stream is deleted,
/// while it awaits asynchronous removal.
pub fn deleted_dir_name(dir_name: &str, deleted_at_ms: i64) -> String {
    format!("{dir_name}{DELETED_MARKER}{deleted_at_ms}")
}
