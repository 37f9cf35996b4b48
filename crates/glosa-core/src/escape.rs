//! Delimiter escape codec for the static file format.
//!
//! Two byte values frame the on-disk records and must never appear
//! literally inside a payload: `0x00` terminates an entry and `0x0A`
//! separates the keyword from the description. Both are replaced by
//! two-byte sequences introduced with `0x1B` before anything is written,
//! and every header property value gets the same treatment.

/// Terminates an entry (and the header).
pub const DATA_DELIMITER: u8 = 0x00;
/// Separates the keyword from the description inside an entry.
pub const WORD_DELIMITER: u8 = 0x0A;

const ESCAPE: u8 = 0x1B;

/// Replace delimiter bytes with their two-byte escape sequences.
///
/// `0x0A` → `ESC n`, `0x00` → `ESC 0`, `ESC` itself → `ESC e`. The result
/// contains no literal `0x00` or `0x0A`.
pub fn escape(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        match b {
            WORD_DELIMITER => out.extend_from_slice(&[ESCAPE, b'n']),
            DATA_DELIMITER => out.extend_from_slice(&[ESCAPE, b'0']),
            ESCAPE => out.extend_from_slice(&[ESCAPE, b'e']),
            _ => out.push(b),
        }
    }
    out
}

/// Inverse of [`escape`].
///
/// An `ESC` followed by an unknown byte is elided rather than rejected, so
/// a corrupt payload degrades instead of failing the whole entry. A
/// trailing lone `ESC` is elided the same way.
pub fn unescape(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut iter = input.iter();
    while let Some(&b) = iter.next() {
        if b != ESCAPE {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'0') => out.push(DATA_DELIMITER),
            Some(b'n') => out.push(WORD_DELIMITER),
            Some(b'e') => out.push(ESCAPE),
            _ => {}
        }
    }
    out
}
