//! Percent-encoding primitives shared by the decoder and the encoder.
//!
//! Besides plain percent-encoding this covers the legacy `escape` /
//! `unescape` convention that Latin-1 querystrings rely on, and the numeric
//! HTML entities (`&#10003;`) browsers emit for characters outside Latin-1.

use std::borrow::Cow;
use std::fmt::Write;

pub use crate::de::parse::decode::decode;
pub use crate::ser::encode::encode;

/// Rewrites every `%20` into `+`, the RFC 1738 rendering of a space.
pub fn replace_encoded_space(token: String) -> String {
    if token.contains("%20") {
        token.replace("%20", "+")
    } else {
        token
    }
}

fn is_escape_safe(unit: u16) -> bool {
    match u8::try_from(unit) {
        Ok(b) => b.is_ascii_alphanumeric() || b"@*_+-./".contains(&b),
        Err(_) => false,
    }
}

/// Escapes `text` the way the legacy `escape` function does.
///
/// Code units below 256 become `%XX`, everything else `%uXXXX`; characters
/// outside the Basic Multilingual Plane are split into their surrogate pair.
///
/// ```
/// use qs_codec::utils::legacy_escape;
///
/// assert_eq!(legacy_escape("a b+ä✓"), "a%20b+%E4%u2713");
/// assert_eq!(legacy_escape("😀"), "%uD83D%uDE00");
/// ```
pub fn legacy_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for unit in text.encode_utf16() {
        if is_escape_safe(unit) {
            out.push(unit as u8 as char);
        } else if unit < 256 {
            let _ = write!(out, "%{unit:02X}");
        } else {
            let _ = write!(out, "%u{unit:04X}");
        }
    }
    out
}

fn hex_at(bytes: &[u8], start: usize, len: usize) -> Option<u16> {
    let digits = bytes.get(start..start + len)?;
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    // all ascii hex digits, so both conversions succeed
    u16::from_str_radix(std::str::from_utf8(digits).ok()?, 16).ok()
}

fn is_high_surrogate(unit: u32) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u32) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

fn combine_surrogates(high: u32, low: u32) -> Option<char> {
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
}

/// Inverse of [`legacy_escape`].
///
/// `%uXXXX` and `%XX` sequences are decoded and surrogate pairs recombined.
/// Malformed sequences and unpaired surrogates are kept as literal text.
///
/// ```
/// use qs_codec::utils::legacy_unescape;
///
/// assert_eq!(legacy_unescape("a%20b%E4%u2713"), "a bä✓");
/// assert_eq!(legacy_unescape("%uD83D%uDE00"), "😀");
/// assert_eq!(legacy_unescape("%zz%uD83D"), "%zz%uD83D");
/// ```
pub fn legacy_unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    // high surrogate waiting for its partner, with the text it came from
    let mut pending: Option<(u32, &str)> = None;
    let mut i = 0;

    while i < bytes.len() {
        let escape = if bytes[i] != b'%' {
            None
        } else if bytes.get(i + 1) == Some(&b'u') {
            hex_at(bytes, i + 2, 4).map(|unit| (unit as u32, 6))
        } else {
            hex_at(bytes, i + 1, 2).map(|unit| (unit as u32, 3))
        };

        let Some((unit, len)) = escape else {
            if let Some((_, source)) = pending.take() {
                out.push_str(source);
            }
            // `i` always sits on a char boundary: escapes are pure ASCII
            let Some(c) = text[i..].chars().next() else {
                break;
            };
            out.push(c);
            i += c.len_utf8();
            continue;
        };

        let source = &text[i..i + len];
        i += len;

        if let Some((high, high_source)) = pending.take() {
            if is_low_surrogate(unit) {
                match combine_surrogates(high, unit) {
                    Some(c) => out.push(c),
                    None => {
                        out.push_str(high_source);
                        out.push_str(source);
                    }
                }
                continue;
            }
            out.push_str(high_source);
        }

        if is_high_surrogate(unit) {
            pending = Some((unit, source));
        } else {
            match char::from_u32(unit) {
                Some(c) => out.push(c),
                None => out.push_str(source),
            }
        }
    }

    if let Some((_, source)) = pending {
        out.push_str(source);
    }
    out
}

/// Parses one `&#N;` / `&#xH;` entity starting at `start`.
///
/// Returns the code point and the index just past the `;`.
fn parse_entity(bytes: &[u8], start: usize) -> Option<(u32, usize)> {
    if bytes.get(start..start + 2)? != b"&#" {
        return None;
    }
    let mut i = start + 2;
    let radix = match bytes.get(i) {
        Some(b'x' | b'X') => {
            i += 1;
            16
        }
        _ => 10,
    };
    let digits_start = i;
    let mut code: u32 = 0;
    while let Some(digit) = bytes.get(i).and_then(|b| (*b as char).to_digit(radix)) {
        code = code.checked_mul(radix)?.checked_add(digit)?;
        i += 1;
    }
    if i == digits_start || bytes.get(i) != Some(&b';') {
        return None;
    }
    Some((code, i + 1))
}

/// Decodes decimal and hexadecimal HTML numeric entities.
///
/// A high/low surrogate pair written as two adjacent entities becomes one
/// character. Malformed, out-of-range, or unpaired surrogate entities are
/// left untouched.
///
/// ```
/// use qs_codec::utils::interpret_numeric_entities;
///
/// assert_eq!(interpret_numeric_entities("&#9786; &#x263A;"), "☺ ☺");
/// assert_eq!(interpret_numeric_entities("&#55357;&#56832;"), "😀");
/// assert_eq!(interpret_numeric_entities("&#xZZ; &#1114112;"), "&#xZZ; &#1114112;");
/// ```
pub fn interpret_numeric_entities(text: &str) -> Cow<'_, str> {
    if !text.contains("&#") {
        return Cow::Borrowed(text);
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        let Some((code, end)) = parse_entity(bytes, i) else {
            i += 1;
            continue;
        };

        let decoded = if is_high_surrogate(code) {
            match parse_entity(bytes, end) {
                Some((low, low_end)) if is_low_surrogate(low) => {
                    combine_surrogates(code, low).map(|c| (c, low_end))
                }
                _ => None,
            }
        } else {
            char::from_u32(code).map(|c| (c, end))
        };

        match decoded {
            Some((c, end)) => {
                out.push_str(&text[last..i]);
                out.push(c);
                last = end;
                i = end;
            }
            None => i = end,
        }
    }

    out.push_str(&text[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_round_trips() {
        for text in ["", "plain", "a b&c=d", "ÿ€", "日本語", "😀 rocket 🚀"] {
            assert_eq!(legacy_unescape(&legacy_escape(text)), text);
        }
    }

    #[test]
    fn escape_leaves_legacy_safe_set() {
        assert_eq!(legacy_escape("@*_+-./"), "@*_+-./");
        assert_eq!(legacy_escape("~!()"), "%7E%21%28%29");
    }

    #[test]
    fn unescape_keeps_lone_surrogates() {
        assert_eq!(legacy_unescape("%uDE00x"), "%uDE00x");
        assert_eq!(legacy_unescape("%uD83Dx"), "%uD83Dx");
        assert_eq!(legacy_unescape("%uD83D%u2713"), "%uD83D✓");
    }

    #[test]
    fn unescape_handles_truncated_sequences() {
        assert_eq!(legacy_unescape("100%"), "100%");
        assert_eq!(legacy_unescape("%u12"), "%u12");
        assert_eq!(legacy_unescape("%4"), "%4");
    }

    #[test]
    fn entities_ignore_unterminated_and_lone_surrogates() {
        assert_eq!(interpret_numeric_entities("&#9786"), "&#9786");
        assert_eq!(interpret_numeric_entities("&#;"), "&#;");
        assert_eq!(interpret_numeric_entities("&#55357;x"), "&#55357;x");
        assert_eq!(interpret_numeric_entities("&#56832;"), "&#56832;");
        assert_eq!(
            interpret_numeric_entities("&#99999999999999999999;"),
            "&#99999999999999999999;"
        );
    }

    #[test]
    fn entities_mixed_with_text() {
        assert_eq!(interpret_numeric_entities("a&#38;b&amp;"), "a&b&amp;");
        assert_eq!(interpret_numeric_entities("&&#65;"), "&A");
    }

    #[test]
    fn encoded_space_replacement() {
        assert_eq!(replace_encoded_space("a%20b%20".into()), "a+b+");
        assert_eq!(replace_encoded_space("a%2520".into()), "a%2520");
    }
}
