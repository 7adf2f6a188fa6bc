// Bytes <-> text for working copies, and editor offsets -> byte indices.
//
// Content is UTF-8. Malformed input decodes with U+FFFD replacement and
// never fails the surrounding operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What an editor offset counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OffsetUnit {
    /// Unicode scalar values.
    #[default]
    Char,
    /// UTF-16 code units, as browser editors count.
    Utf16,
}

impl OffsetUnit {
    fn width(self, ch: char) -> usize {
        match self {
            Self::Char => 1,
            Self::Utf16 => ch.len_utf16(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("offset {offset} is out of range for text of {len} {unit:?} units")]
pub struct OffsetOutOfRange {
    pub offset: usize,
    pub len: usize,
    pub unit: OffsetUnit,
}

pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Length of `text` in `unit`s.
pub fn unit_len(text: &str, unit: OffsetUnit) -> usize {
    match unit {
        OffsetUnit::Char => text.chars().count(),
        OffsetUnit::Utf16 => text.encode_utf16().count(),
    }
}

/// Byte index of the `offset`-th unit of `text`.
///
/// `offset == unit_len` maps to the end of the text. An offset past the end
/// or inside a surrogate pair has no byte index.
pub fn byte_index(text: &str, offset: usize, unit: OffsetUnit) -> Option<usize> {
    let mut units = 0usize;
    for (idx, ch) in text.char_indices() {
        if units == offset {
            return Some(idx);
        }
        if units > offset {
            return None;
        }
        units += unit.width(ch);
    }
    (units == offset).then_some(text.len())
}

/// Byte index `count` units after byte index `from`, clamped to the end of `text`.
///
/// A count ending inside a surrogate pair swallows the whole character.
pub fn advance(text: &str, from: usize, count: usize, unit: OffsetUnit) -> usize {
    let mut units = 0usize;
    for (idx, ch) in text[from..].char_indices() {
        if units >= count {
            return from + idx;
        }
        units += unit.width(ch);
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_well_formed_utf8() {
        let text = "héllo 🙂 中文";
        assert_eq!(bytes_to_text(&text_to_bytes(text)), text);
    }

    #[test]
    fn malformed_bytes_decode_with_replacement() {
        let decoded = bytes_to_text(&[b'a', 0xff, b'b']);
        assert_eq!(decoded, "a\u{FFFD}b");
    }

    #[test]
    fn char_offsets_skip_multibyte_sequences() {
        let text = "aé🙂b";
        assert_eq!(byte_index(text, 0, OffsetUnit::Char), Some(0));
        assert_eq!(byte_index(text, 1, OffsetUnit::Char), Some(1));
        assert_eq!(byte_index(text, 2, OffsetUnit::Char), Some(3));
        assert_eq!(byte_index(text, 3, OffsetUnit::Char), Some(7));
        assert_eq!(byte_index(text, 4, OffsetUnit::Char), Some(8));
        assert_eq!(byte_index(text, 5, OffsetUnit::Char), None);
    }

    #[test]
    fn utf16_offsets_count_surrogate_pairs_as_two() {
        let text = "a🙂b";
        assert_eq!(unit_len(text, OffsetUnit::Utf16), 4);
        assert_eq!(byte_index(text, 1, OffsetUnit::Utf16), Some(1));
        assert_eq!(byte_index(text, 2, OffsetUnit::Utf16), None);
        assert_eq!(byte_index(text, 3, OffsetUnit::Utf16), Some(5));
        assert_eq!(byte_index(text, 4, OffsetUnit::Utf16), Some(6));
    }

    #[test]
    fn empty_text_has_only_offset_zero() {
        assert_eq!(byte_index("", 0, OffsetUnit::Char), Some(0));
        assert_eq!(byte_index("", 1, OffsetUnit::Char), None);
    }

    #[test]
    fn advance_clamps_to_end() {
        let text = "abc🙂";
        assert_eq!(advance(text, 1, 2, OffsetUnit::Char), 3);
        assert_eq!(advance(text, 1, 50, OffsetUnit::Char), text.len());
        assert_eq!(advance(text, 3, 1, OffsetUnit::Utf16), text.len());
        assert_eq!(advance(text, 0, 0, OffsetUnit::Char), 0);
    }
}
