//! Modified UTF-8 codec (spec.md §4.1).
//!
//! This is Java's "modified UTF-8": `U+0000` encodes as the two-byte sequence
//! `C0 80`, and code points above `U+FFFF` are represented as a CESU-8-style
//! surrogate pair (each half a 3-byte sequence), never as a 4-byte UTF-8
//! sequence. That's exactly what the `cesu8` crate's `*_java_cesu8` functions
//! implement (the same crate `hdbconnect_impl` depends on for its own CESU-8
//! command strings), so it does the encode/decode heavy lifting here; this
//! module adds the extra validation spec.md requires on decode.

use crate::error::{DecodeErrorKind, OpenWireError, OpenWireResult};

/// Length threshold (exclusive) at which the wire switches from the `STRING`
/// tag (`u16` length) to the `BIG_STRING` tag (`i32` length).
pub const STRING_LENGTH_LIMIT: usize = 32_768;

pub fn encode(s: &str) -> Vec<u8> {
    cesu8::to_java_cesu8(s).into_owned()
}

/// Decodes a modified-UTF-8 byte slice back into a `String`.
///
/// When `single_byte_context` is set, the caller is decoding into a context
/// that only accepts values fitting in a single byte (e.g. a `CHAR`
/// primitive); any decoded code point above `0xFF` is rejected.
pub fn decode(bytes: &[u8], single_byte_context: bool) -> OpenWireResult<String> {
    validate_well_formed(bytes, 0)?;
    let decoded = cesu8::from_java_cesu8(bytes).map_err(|_| {
        OpenWireError::decode(DecodeErrorKind::MalformedModifiedUtf8, 0)
    })?;
    if single_byte_context && decoded.chars().any(|c| (c as u32) > 0xFF) {
        return Err(OpenWireError::decode(
            DecodeErrorKind::MalformedModifiedUtf8,
            0,
        ));
    }
    Ok(decoded.into_owned())
}

/// Performs the byte-level structural checks spec.md calls out explicitly:
/// truncated multi-byte sequences, and 3-byte sequences whose lead byte is
/// not `0xE_`. `cesu8`'s own decoder already rejects these, but we walk the
/// bytes ourselves first so the error carries the precise offset spec.md's
/// `DecodeError { kind, offset }` wants, rather than `cesu8`'s own error type.
fn validate_well_formed(bytes: &[u8], base_offset: usize) -> OpenWireResult<()> {
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let len = if b0 & 0x80 == 0 {
            1
        } else if b0 & 0xE0 == 0xC0 {
            2
        } else if b0 & 0xF0 == 0xE0 {
            3
        } else {
            return Err(OpenWireError::decode(
                DecodeErrorKind::MalformedModifiedUtf8,
                base_offset + i,
            ));
        };
        if i + len > bytes.len() {
            return Err(OpenWireError::decode(
                DecodeErrorKind::MalformedModifiedUtf8,
                base_offset + i,
            ));
        }
        for (k, byte) in bytes[i + 1..i + len].iter().enumerate() {
            if byte & 0xC0 != 0x80 {
                return Err(OpenWireError::decode(
                    DecodeErrorKind::MalformedModifiedUtf8,
                    base_offset + i + 1 + k,
                ));
            }
        }
        i += len;
    }
    Ok(())
}

/// Whether `s`, written in modified UTF-8, must use the `BIG_STRING` tag.
pub fn requires_big_string(s: &str) -> bool {
    encode(s).len() >= STRING_LENGTH_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_character_round_trips_via_c0_80() {
        // spec.md scenario 5: encode { 'A', 0x00, 'B' } -> 41 C0 80 42
        let s = "A\u{0}B";
        let bytes = encode(s);
        assert_eq!(bytes, vec![0x41, 0xC0, 0x80, 0x42]);
        let back = decode(&bytes, false).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn round_trip_identity_for_bmp_code_points() {
        let s = "héllo\u{0}wörld\u{ffff}";
        let bytes = encode(s);
        let back = decode(&bytes, false).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn truncated_three_byte_sequence_is_rejected() {
        let bytes = [0xE0, 0x80];
        let err = decode(&bytes, false).unwrap_err();
        assert!(matches!(
            err,
            OpenWireError::Decode {
                kind: DecodeErrorKind::MalformedModifiedUtf8,
                ..
            }
        ));
    }

    #[test]
    fn bad_continuation_byte_is_rejected() {
        let bytes = [0xE0, 0x00, 0x80];
        assert!(decode(&bytes, false).is_err());
    }

    #[test]
    fn big_string_threshold_at_32767_vs_32768() {
        let just_under = "x".repeat(STRING_LENGTH_LIMIT - 1);
        let at_limit = "x".repeat(STRING_LENGTH_LIMIT);
        assert!(!requires_big_string(&just_under));
        assert!(requires_big_string(&at_limit));
    }
}
