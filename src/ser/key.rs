//! Key prefixes of nested values, built one segment at a time: `a` then
//! `[b]`, `.b`, `[0]` or `[]`.

use std::borrow::Cow;

use crate::config::{EncodeOptions, ListFormat};

/// Writes literal dots of a key segment as `%2E`.
fn encode_dots(segment: &str) -> Cow<'_, str> {
    if segment.contains('.') {
        Cow::Owned(segment.replace('.', "%2E"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// The prefix of a top-level key.
pub(crate) fn root_key(key: &str, options: &EncodeOptions) -> String {
    if options.encode_dot_in_keys {
        encode_dots(key).into_owned()
    } else {
        key.to_owned()
    }
}

/// The segment appended to a prefix for map entry `key`: `.key` under
/// dot notation, `[key]` otherwise.
pub(crate) fn map_segment(key: &str, options: &EncodeOptions) -> String {
    if options.dots_enabled() {
        let key = if options.encode_dot_in_keys {
            encode_dots(key)
        } else {
            Cow::Borrowed(key)
        };
        format!(".{key}")
    } else {
        format!("[{key}]")
    }
}

/// The segment appended to a prefix for list element `index`.
///
/// [`ListFormat::Comma`] never reaches here: comma lists are joined into a
/// single value under the list's own prefix.
pub(crate) fn list_segment(index: &str, format: ListFormat) -> String {
    match format {
        ListFormat::Indices => format!("[{index}]"),
        ListFormat::Brackets => "[]".to_owned(),
        ListFormat::Repeat | ListFormat::Comma => String::new(),
    }
}
