use std::borrow::Cow;

use crate::config::Charset;

#[inline(always)]
fn char_to_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

/// Whether some `%` is not followed by two hex digits.
fn has_malformed_escape(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.iter().enumerate().any(|(idx, &b)| {
        b == b'%'
            && !(bytes.get(idx + 1).copied().and_then(char_to_digit).is_some()
                && bytes.get(idx + 2).copied().and_then(char_to_digit).is_some())
    })
}

fn replace_plus(input: &str) -> Cow<'_, str> {
    if input.contains('+') {
        Cow::Owned(input.replace('+', " "))
    } else {
        Cow::Borrowed(input)
    }
}

/// Decodes a key or value token, applying the following:
/// - Replaces `+` with a space
/// - Decodes percent-encoded sequences according to `charset`
///
/// In UTF-8 mode a token with a malformed escape, or whose decoded bytes
/// are not valid UTF-8, is returned with only the `+` replacement applied.
/// In Latin-1 mode every well-formed `%XX` maps to the character U+00XX and
/// malformed escapes are kept literally. This never fails.
///
/// ```
/// use qs_codec::utils::decode;
/// use qs_codec::Charset;
///
/// assert_eq!(decode("a+b%20c%E2%9C%93", Charset::Utf8), "a b c✓");
/// assert_eq!(decode("%E4%zz", Charset::Latin1), "ä%zz");
/// assert_eq!(decode("%E4", Charset::Utf8), "%E4");
/// ```
pub fn decode(input: &str, charset: Charset) -> Cow<'_, str> {
    if !input.bytes().any(|b| b == b'+' || b == b'%') {
        return Cow::Borrowed(input);
    }

    let plus_replaced = replace_plus(input);
    match charset {
        Charset::Utf8 if has_malformed_escape(&plus_replaced) => {
            Cow::Owned(plus_replaced.into_owned())
        }
        Charset::Utf8 => {
            let decoded = percent_encoding::percent_decode_str(&plus_replaced)
                .decode_utf8()
                .map(Cow::into_owned);
            match decoded {
                Ok(decoded) => Cow::Owned(decoded),
                Err(_) => Cow::Owned(plus_replaced.into_owned()),
            }
        }
        Charset::Latin1 => Cow::Owned(decode_latin1(&plus_replaced)),
    }
}

/// This code is adapted from `rust-url`'s percent decoder, emitting one
/// character per decoded byte instead of collecting UTF-8.
fn decode_latin1(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = String::with_capacity(input.len());
    let mut last_segment = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] != b'%' {
            idx += 1;
            continue;
        }
        let hex = bytes.get(idx + 1).copied().and_then(char_to_digit).zip(
            bytes.get(idx + 2).copied().and_then(char_to_digit),
        );
        let Some((h, l)) = hex else {
            // skip over the invalid percent-encoded character
            idx += 1;
            continue;
        };

        decoded.push_str(&input[last_segment..idx]);
        decoded.push(char::from(h * 0x10 + l));
        idx += 3;
        last_segment = idx;
    }

    decoded.push_str(&input[last_segment..]);
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn borrowed_when_nothing_to_decode() {
        assert!(matches!(decode("plain", Charset::Utf8), Cow::Borrowed("plain")));
    }

    #[test]
    fn malformed_escape_is_literal() {
        assert_eq!(decode("100%", Charset::Utf8), "100%");
        assert_eq!(decode("%zz%41+b", Charset::Utf8), "%zz%41 b");
        assert_eq!(decode("%41%4", Charset::Utf8), "%41%4");
        assert_eq!(decode("%zz%41", Charset::Latin1), "%zzA");
        assert_eq!(decode("%4", Charset::Latin1), "%4");
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        assert_eq!(decode("%FF+%41", Charset::Latin1), "ÿ A");
        assert_eq!(decode("%26%2310003%3B", Charset::Latin1), "&#10003;");
    }

    #[test]
    fn invalid_utf8_falls_back_to_token() {
        assert_eq!(decode("a+%FF", Charset::Utf8), "a %FF");
    }
}
