//! Series primitives (spec §4.3): growable-array operations shared by
//! every series datatype, plus the string auto-widen/flatten rule.
//!
//! Each element-size family (1/2/4/8/16 bytes) gets the same four
//! operations — reserve, append, erase, copy-slice — so callers never
//! hand-roll `Vec` splicing. `Cells` (blocks/paths/contexts) reuse the same
//! shape at 16-byte elements.

use boron_core::Cell;

use crate::buffer::{BufferData, StringEncoding};

/// Ensure a byte buffer can hold at least `additional` more bytes without
/// reallocating on the next append.
pub fn reserve_bytes(v: &mut Vec<u8>, additional: usize) {
    v.reserve(additional);
}

/// Insert `data` at `at`, shifting the tail right (spec "insert" op).
pub fn insert_bytes(v: &mut Vec<u8>, at: usize, data: &[u8]) {
    let at = at.min(v.len());
    v.splice(at..at, data.iter().copied());
}

/// Remove `[at, at+count)`, shifting the tail left (spec "remove"/"clear" op).
pub fn erase_bytes(v: &mut Vec<u8>, at: usize, count: usize) {
    let end = (at + count).min(v.len());
    let at = at.min(end);
    v.drain(at..end);
}

pub fn insert_wide(v: &mut Vec<u16>, at: usize, data: &[u16]) {
    let at = at.min(v.len());
    v.splice(at..at, data.iter().copied());
}

pub fn erase_wide(v: &mut Vec<u16>, at: usize, count: usize) {
    let end = (at + count).min(v.len());
    let at = at.min(end);
    v.drain(at..end);
}

pub fn insert_cells(v: &mut Vec<Cell>, at: usize, data: &[Cell]) {
    let at = at.min(v.len());
    v.splice(at..at, data.iter().copied());
}

pub fn erase_cells(v: &mut Vec<Cell>, at: usize, count: usize) {
    let end = (at + count).min(v.len());
    let at = at.min(end);
    v.drain(at..end);
}

/// Decode a string buffer's `[from, to)` slice to a `String`, independent
/// of its current backing encoding (spec §4.3).
pub fn string_slice_to_string(data: &BufferData, encoding: StringEncoding, from: usize, to: usize) -> String {
    match (data, encoding) {
        (BufferData::Bytes(bytes), StringEncoding::Latin1) => {
            bytes[from.min(bytes.len())..to.min(bytes.len())].iter().map(|&b| b as char).collect()
        }
        (BufferData::Bytes(bytes), StringEncoding::Utf8) => {
            String::from_utf8_lossy(&bytes[from.min(bytes.len())..to.min(bytes.len())]).into_owned()
        }
        (BufferData::Wide(wide), StringEncoding::Ucs2) => {
            char::decode_utf16(wide[from.min(wide.len())..to.min(wide.len())].iter().copied())
                .map(|r| r.unwrap_or('\u{fffd}'))
                .collect()
        }
        _ => String::new(),
    }
}

/// Widen a Latin1 byte buffer to Ucs2 (spec §4.3: required before storing a
/// codepoint above U+00FF).
pub fn widen_latin1_to_ucs2(bytes: &[u8]) -> Vec<u16> {
    bytes.iter().map(|&b| b as u16).collect()
}

/// Flatten a Ucs2 buffer back to Latin1 if every unit fits in a byte,
/// otherwise return `None` (spec §4.3's auto-narrow rule, applied after a
/// char is removed/replaced).
pub fn flatten_ucs2_to_latin1(wide: &[u16]) -> Option<Vec<u8>> {
    if wide.iter().all(|&u| u <= 0xff) {
        Some(wide.iter().map(|&u| u as u8).collect())
    } else {
        None
    }
}

/// Append one character to a string buffer, widening Latin1 -> Ucs2 or
/// upgrading to Utf8 in place if `ch` doesn't fit the current encoding.
pub fn string_append_char(data: &mut BufferData, encoding: &mut StringEncoding, ch: char) {
    match (*encoding, &mut *data) {
        (StringEncoding::Latin1, BufferData::Bytes(bytes)) if (ch as u32) <= 0xff => {
            bytes.push(ch as u8);
        }
        (StringEncoding::Latin1, BufferData::Bytes(bytes)) if (ch as u32) <= 0xffff => {
            let mut wide = widen_latin1_to_ucs2(bytes);
            wide.push(ch as u16);
            *encoding = StringEncoding::Ucs2;
            *data = BufferData::Wide(wide);
        }
        (StringEncoding::Latin1, BufferData::Bytes(bytes)) => {
            let mut s: String = bytes.iter().map(|&b| b as char).collect();
            s.push(ch);
            *encoding = StringEncoding::Utf8;
            *data = BufferData::Bytes(s.into_bytes());
        }
        (StringEncoding::Ucs2, BufferData::Wide(wide)) if (ch as u32) <= 0xffff => {
            wide.push(ch as u16);
        }
        (StringEncoding::Ucs2, BufferData::Wide(wide)) => {
            let mut s = String::from_utf16_lossy(wide);
            s.push(ch);
            *encoding = StringEncoding::Utf8;
            *data = BufferData::Bytes(s.into_bytes());
        }
        (StringEncoding::Utf8, BufferData::Bytes(bytes)) => {
            let mut s = String::from_utf8(std::mem::take(bytes)).unwrap_or_default();
            s.push(ch);
            *bytes = s.into_bytes();
        }
        _ => {}
    }
}

/// Case-insensitive search over the first Unicode block via a 256-entry
/// lowercase lookup table (spec §4.3's fast path for ASCII/Latin1 `find`).
pub fn lowercase_table() -> &'static [u8; 256] {
    static TABLE: std::sync::OnceLock<[u8; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0u8; 256];
        for (i, slot) in t.iter_mut().enumerate() {
            *slot = (i as u8).to_ascii_lowercase();
        }
        t
    })
}

/// Find `needle` in `haystack`, case-insensitively, restricted to bytes
/// covered by `lowercase_table` (Latin1 range); returns the byte offset.
pub fn find_ci_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let table = lowercase_table();
    let needle_lower: Vec<u8> = needle.iter().map(|&b| table[b as usize]).collect();
    haystack.windows(needle.len()).position(|w| {
        w.iter().zip(needle_lower.iter()).all(|(&h, &n)| table[h as usize] == n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_erase_bytes() {
        let mut v = vec![1u8, 2, 3];
        insert_bytes(&mut v, 1, &[9, 9]);
        assert_eq!(v, vec![1, 9, 9, 2, 3]);
        erase_bytes(&mut v, 1, 2);
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn widen_then_flatten_roundtrips_when_representable() {
        let latin1 = b"hello";
        let wide = widen_latin1_to_ucs2(latin1);
        let flat = flatten_ucs2_to_latin1(&wide).unwrap();
        assert_eq!(flat, latin1);
    }

    #[test]
    fn flatten_fails_when_codepoint_exceeds_latin1() {
        let wide = vec![0x41u16, 0x0100];
        assert!(flatten_ucs2_to_latin1(&wide).is_none());
    }

    #[test]
    fn append_char_widens_latin1_on_overflow() {
        let mut data = BufferData::Bytes(b"ab".to_vec());
        let mut enc = StringEncoding::Latin1;
        string_append_char(&mut data, &mut enc, '\u{100}');
        assert_eq!(enc, StringEncoding::Ucs2);
        match data {
            BufferData::Wide(w) => assert_eq!(w, vec![b'a' as u16, b'b' as u16, 0x100]),
            _ => panic!("expected widened buffer"),
        }
    }

    #[test]
    fn find_ci_matches_regardless_of_case() {
        let haystack = b"Hello World";
        assert_eq!(find_ci_bytes(haystack, b"world"), Some(6));
        assert_eq!(find_ci_bytes(haystack, b"xyz"), None);
    }
}
