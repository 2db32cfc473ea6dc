use std::fmt::Write;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

use crate::config::{Charset, Format};
use crate::utils::legacy_escape;

/// As defined in https://datatracker.ietf.org/doc/html/rfc3986#section-2.3
///
/// Everything except the unreserved characters (ASCII alphanumerics,
/// `-`, `.`, `_` and `~`) is percent-encoded.
const RFC3986_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// RFC 1738 additionally leaves the parentheses alone.
const RFC1738_SET: &AsciiSet = &RFC3986_SET.remove(b'(').remove(b')');

fn encode_set(format: Format) -> &'static AsciiSet {
    match format {
        Format::Rfc3986 => RFC3986_SET,
        Format::Rfc1738 => RFC1738_SET,
    }
}

/// Percent-encodes `text` without the format post-pass.
pub(crate) fn encode_raw(text: &str, charset: Charset, format: Format) -> String {
    if text.is_empty() {
        return String::new();
    }
    match charset {
        Charset::Utf8 => percent_encoding::utf8_percent_encode(text, encode_set(format)).to_string(),
        Charset::Latin1 => encode_latin1(text),
    }
}

/// Percent-encodes raw bytes as UTF-8 would, without reinterpreting them.
pub(crate) fn encode_bytes_raw(bytes: &[u8], format: Format) -> String {
    percent_encoding::percent_encode(bytes, encode_set(format)).to_string()
}

/// Latin-1 encoding goes through the legacy `escape` convention; characters
/// outside the charset become a percent-encoded numeric entity `&#N;`.
fn encode_latin1(text: &str) -> String {
    let escaped = legacy_escape(text);
    if !escaped.contains("%u") {
        return escaped;
    }

    let mut out = String::with_capacity(escaped.len() + 16);
    let mut rest = escaped.as_str();
    while let Some(pos) = rest.find("%u") {
        out.push_str(&rest[..pos]);
        // `legacy_escape` always writes four hex digits after `%u`
        let digits = &rest[pos + 2..pos + 6];
        match u16::from_str_radix(digits, 16) {
            Ok(unit) => {
                let _ = write!(out, "%26%23{unit}%3B");
            }
            Err(_) => out.push_str(&rest[pos..pos + 6]),
        }
        rest = &rest[pos + 6..];
    }
    out.push_str(rest);
    out
}

/// Encodes a key or value for use in a querystring.
///
/// This function supports two charsets:
///
/// ## UTF-8 (default)
/// Uses the RFC 3986 unreserved set: anything other than ASCII
/// alphanumerics and `-._~` is written as `%XX` of its UTF-8 bytes.
/// With [`Format::Rfc1738`] parentheses are kept and spaces become `+`.
///
/// ## Latin-1
/// Uses the legacy `escape` convention, with characters above U+00FF
/// written as a percent-encoded numeric entity.
///
/// ```
/// use qs_codec::utils::encode;
/// use qs_codec::{Charset, Format};
///
/// assert_eq!(encode("a b(c)", Charset::Utf8, Format::Rfc3986), "a%20b%28c%29");
/// assert_eq!(encode("a b(c)", Charset::Utf8, Format::Rfc1738), "a+b(c)");
/// assert_eq!(encode("ä✓", Charset::Latin1, Format::Rfc3986), "%E4%26%2310003%3B");
/// ```
pub fn encode(text: &str, charset: Charset, format: Format) -> String {
    format.apply(encode_raw(text, charset, format))
}
