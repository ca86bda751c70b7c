//! Stream position tokens.
//!
//! An offset is the pair `(read_seq, byte_offset)` of unsigned 64-bit
//! integers. `read_seq` counts messages visible on the stream; `byte_offset`
//! is the byte position in the segment file *after* the message's frame. The
//! writer keeps the two in sync, so an offset handed out by the server always
//! lands on a frame boundary.
//!
//! ## Canonical form
//!
//! Two zero-padded 16-digit decimals joined by `_`:
//!
//! ```text
//! 0000000000000003_0000000000000142
//! ```
//!
//! Lexicographic order on the canonical form equals numeric order on the
//! pair, which is what makes offsets usable as opaque, sortable tokens in
//! URLs, headers, and ETags.
//!
//! ## Parsing
//!
//! Parsing is strict: exactly sixteen ASCII digits per half. Offsets are
//! tokens the server itself minted, so anything looser (signs, whitespace,
//! shorter digit runs, scientific notation) is rejected. The single literal
//! `-1` is accepted and means "before the start of the stream"; it parses to
//! [`Offset::ZERO`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Width of each zero-padded half of the canonical form.
const PAD: usize = 16;

/// A position in a stream: `(read_seq, byte_offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    /// Count of messages at or before this position.
    pub read_seq: u64,
    /// Byte position in the segment file after the last counted frame.
    pub byte_offset: u64,
}

impl Offset {
    /// The position before the first message. `-1` parses to this.
    pub const ZERO: Offset = Offset {
        read_seq: 0,
        byte_offset: 0,
    };

    pub fn new(read_seq: u64, byte_offset: u64) -> Self {
        Self {
            read_seq,
            byte_offset,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The position after appending `frames` messages totalling `bytes`
    /// encoded bytes at this position.
    pub fn advance(&self, frames: u64, bytes: u64) -> Offset {
        Offset {
            read_seq: self.read_seq + frames,
            byte_offset: self.byte_offset + bytes,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0pad$}_{:0pad$}",
            self.read_seq,
            self.byte_offset,
            pad = PAD
        )
    }
}

impl FromStr for Offset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-1" {
            return Ok(Offset::ZERO);
        }

        let invalid = || Error::InvalidOffset(s.to_string());

        let bytes = s.as_bytes();
        if bytes.len() != PAD * 2 + 1 || bytes[PAD] != b'_' {
            return Err(invalid());
        }

        let parse_half = |half: &str| -> Result<u64, Error> {
            if !half.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            // Sixteen decimal digits always fit in a u64.
            half.parse::<u64>().map_err(|_| invalid())
        };

        Ok(Offset {
            read_seq: parse_half(&s[..PAD])?,
            byte_offset: parse_half(&s[PAD + 1..])?,
        })
    }
}

impl Serialize for Offset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Formatting
    // ---------------------------------------------------------------

    #[test]
    fn format_zero() {
        assert_eq!(
            Offset::ZERO.to_string(),
            "0000000000000000_0000000000000000"
        );
    }

    #[test]
    fn format_pads_both_halves() {
        assert_eq!(
            Offset::new(3, 142).to_string(),
            "0000000000000003_0000000000000142"
        );
    }

    #[test]
    fn format_max_values() {
        let s = Offset::new(u64::MAX, u64::MAX).to_string();
        assert_eq!(s, "18446744073709551615_18446744073709551615");
    }

    // ---------------------------------------------------------------
    // Parsing
    // ---------------------------------------------------------------

    #[test]
    fn parse_roundtrip() {
        for off in [
            Offset::ZERO,
            Offset::new(1, 10),
            Offset::new(3, 142),
            Offset::new(9_999_999_999_999_999, 9_999_999_999_999_999),
        ] {
            let parsed: Offset = off.to_string().parse().unwrap();
            assert_eq!(parsed, off);
        }
    }

    #[test]
    fn parse_minus_one_is_zero() {
        let off: Offset = "-1".parse().unwrap();
        assert!(off.is_zero());
    }

    #[test]
    fn parse_rejects_loose_forms() {
        for bad in [
            "",
            "0",
            "0_0",
            "3_142",
            "-2",
            "+0000000000000003_0000000000000142",
            "0000000000000003-0000000000000142",
            "0000000000000003_0000000000000142 ",
            " 0000000000000003_0000000000000142",
            "0000000000000003__000000000000142",
            "000000000000003_0000000000000142",
            "00000000000000031_0000000000000142",
            "0000000000000003_00000000000001e2",
            "0000000000000003",
            "0000000000000003_0000000000000142_0000000000000001",
        ] {
            assert!(bad.parse::<Offset>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_rejects_unicode_digits() {
        // Arabic-Indic digits are not ASCII digits.
        assert!("000000000000000\u{0663}_0000000000000142"
            .parse::<Offset>()
            .is_err());
    }

    // ---------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------

    #[test]
    fn order_matches_pair_order() {
        let a = Offset::new(0, 100);
        let b = Offset::new(0, 200);
        let c = Offset::new(1, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn order_matches_lexicographic_canonical_form() {
        let offsets = [
            Offset::ZERO,
            Offset::new(0, 1),
            Offset::new(0, u64::MAX >> 16),
            Offset::new(1, 0),
            Offset::new(2, 5),
        ];
        for a in offsets {
            for b in offsets {
                assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
            }
        }
    }

    // ---------------------------------------------------------------
    // Advance
    // ---------------------------------------------------------------

    #[test]
    fn advance_adds_frames_and_bytes() {
        let off = Offset::new(2, 30).advance(3, 42);
        assert_eq!(off, Offset::new(5, 72));
    }

    // ---------------------------------------------------------------
    // Serde
    // ---------------------------------------------------------------

    #[test]
    fn serde_as_canonical_string() {
        let off = Offset::new(1, 10);
        let json = serde_json::to_string(&off).unwrap();
        assert_eq!(json, "\"0000000000000001_0000000000000010\"");
        let back: Offset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, off);
    }

    #[test]
    fn serde_rejects_malformed() {
        assert!(serde_json::from_str::<Offset>("\"1_10\"").is_err());
    }
}
