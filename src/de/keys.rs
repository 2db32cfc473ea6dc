//! Splitting of raw keys into path segments, and building the nested
//! fragment a single `key=value` pair describes.

use std::borrow::Cow;

use tracing::trace;

use crate::config::DecodeOptions;
use crate::error::{Error, Result};

use super::parse::{ParsedMap, ParsedValue, combine};

/// Rewrites top-level dot notation into brackets: `a.b.c` becomes
/// `a[b][c]`.
///
/// Dots inside brackets are left alone, as are a leading dot, the first dot
/// of a `..` pair, and a trailing dot. A dot directly before `[` is dropped
/// (`a.[b]` reads as `a[b]`).
fn dots_to_brackets(key: &str) -> Cow<'_, str> {
    if !key.contains('.') {
        return Cow::Borrowed(key);
    }

    let bytes = key.as_bytes();
    let mut out = String::with_capacity(key.len() + 4);
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'.' if depth == 0 && i > 0 => {
                match bytes.get(i + 1) {
                    None | Some(b'.') => {}
                    Some(b'[') => {
                        out.push_str(&key[last..i]);
                        last = i + 1;
                    }
                    Some(_) => {
                        let start = i + 1;
                        let end = key[start..]
                            .find(['.', '['])
                            .map_or(key.len(), |offset| start + offset);
                        out.push_str(&key[last..i]);
                        out.push('[');
                        out.push_str(&key[start..end]);
                        out.push(']');
                        last = end;
                        i = end;
                        continue;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&key[last..]);
    Cow::Owned(out)
}

/// Finds the `]` balancing the `[` at `open`.
fn matching_close(key: &str, open: usize) -> Option<usize> {
    let mut level = 0usize;
    for (i, b) in key.bytes().enumerate().skip(open) {
        match b {
            b'[' => level += 1,
            b']' => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a decoded key into its path segments.
///
/// The text before the first `[` is the parent segment (omitted when
/// empty); then at most `depth` balanced bracket groups follow, brackets
/// included. Whatever remains is wrapped into one final `[...]` segment,
/// or rejected when `strict_depth` is set and the remainder holds another
/// well-formed group.
///
/// ```text
/// a[b][c]      => ["a", "[b]", "[c]"]
/// a[b[c]]      => ["a", "[b[c]]"]
/// a[b][c][d]   => ["a", "[b]", "[[c][d]]"]    (depth 1)
/// ```
pub(crate) fn split_key(key: &str, options: &DecodeOptions) -> Result<Vec<String>> {
    if options.depth == 0 {
        return Ok(vec![key.to_owned()]);
    }
    let key = if options.dots_enabled() {
        dots_to_brackets(key)
    } else {
        Cow::Borrowed(key)
    };

    let mut segments = Vec::new();
    let first_open = key.find('[');
    let parent = &key[..first_open.unwrap_or(key.len())];
    if !parent.is_empty() {
        segments.push(parent.to_owned());
    }

    let mut open = first_open;
    let mut last_close = None;
    let mut groups = 0;
    while let Some(start) = open {
        if groups == options.depth {
            break;
        }
        let Some(close) = matching_close(&key, start) else {
            break;
        };
        segments.push(key[start..=close].to_owned());
        groups += 1;
        last_close = Some(close);
        open = key[close + 1..].find('[').map(|offset| close + 1 + offset);
    }

    match open {
        Some(start) => {
            let well_formed = matching_close(&key, start).is_some();
            if options.strict_depth && well_formed && groups == options.depth {
                return Err(Error::DepthExceeded {
                    max_depth: options.depth,
                });
            }
            trace!(key = %key, groups, "collapsing the rest of the key into one segment");
            segments.push(format!("[{}]", &key[start..]));
        }
        None => {
            let trailing = last_close.map_or("", |close| &key[close + 1..]);
            if !trailing.is_empty() {
                segments.push(format!("[{trailing}]"));
            }
        }
    }

    Ok(segments)
}

fn decode_dots(segment: &str) -> Cow<'_, str> {
    if segment.contains("%2E") || segment.contains("%2e") {
        Cow::Owned(segment.replace("%2E", ".").replace("%2e", "."))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Recognizes `[N]` segments that address a list slot: `N` must be a
/// canonical decimal (no sign, no leading zeros) within the list limit.
fn list_index(name: &str, options: &DecodeOptions) -> Option<usize> {
    let index: usize = name.parse().ok()?;
    (index <= options.list_limit && index.to_string() == name).then_some(index)
}

/// Builds the nested value one key describes, from the innermost segment
/// outwards.
pub(crate) fn build_fragment(
    segments: &[String],
    leaf: ParsedValue,
    options: &DecodeOptions,
) -> Result<ParsedValue> {
    let mut leaf = leaf;
    for segment in segments.iter().rev() {
        if segment == "[]" && options.parse_lists {
            let empty_leaf = match &leaf {
                ParsedValue::String(s) => s.is_empty(),
                ParsedValue::Null => options.strict_null_handling,
                _ => false,
            };
            leaf = if matches!(leaf, ParsedValue::Overflow { .. }) {
                leaf
            } else if options.allow_empty_lists && empty_leaf {
                ParsedValue::List(Vec::new())
            } else {
                combine(ParsedValue::List(Vec::new()), leaf, options)?
            };
            continue;
        }

        let bracketed = segment.len() >= 2 && segment.starts_with('[') && segment.ends_with(']');
        let name = if bracketed {
            &segment[1..segment.len() - 1]
        } else {
            segment.as_str()
        };
        let name = if options.decode_dot_in_keys {
            decode_dots(name)
        } else {
            Cow::Borrowed(name)
        };

        let index = if bracketed && options.parse_lists {
            list_index(&name, options)
        } else {
            None
        };

        leaf = if !options.parse_lists && name.is_empty() {
            ParsedValue::Map(ParsedMap::from([("0".to_owned(), leaf)]))
        } else if let Some(index) = index {
            let mut list = Vec::with_capacity(index + 1);
            list.resize_with(index, || ParsedValue::Omitted);
            list.push(leaf);
            ParsedValue::List(list)
        } else {
            ParsedValue::Map(ParsedMap::from([(name.into_owned(), leaf)]))
        };
    }
    Ok(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split(key: &str, options: &DecodeOptions) -> Vec<String> {
        split_key(key, options).unwrap()
    }

    fn leaf(s: &str) -> ParsedValue {
        ParsedValue::String(s.to_owned())
    }

    fn map(key: &str, value: ParsedValue) -> ParsedValue {
        ParsedValue::Map(ParsedMap::from([(key.to_owned(), value)]))
    }

    #[test]
    fn dots_become_brackets() {
        assert_eq!(dots_to_brackets("a.b.c"), "a[b][c]");
        assert_eq!(dots_to_brackets("a[b.c].d"), "a[b.c][d]");
        assert_eq!(dots_to_brackets("a.[b]"), "a[b]");
        assert_eq!(dots_to_brackets("a..b"), "a.[b]");
        assert_eq!(dots_to_brackets(".a"), ".a");
        assert_eq!(dots_to_brackets("a."), "a.");
        assert_eq!(dots_to_brackets("plain"), "plain");
    }

    #[test]
    fn split_nested_groups() {
        let options = DecodeOptions::new();
        assert_eq!(split("a[b][c]", &options), ["a", "[b]", "[c]"]);
        assert_eq!(split("a[b[c]]", &options), ["a", "[b[c]]"]);
        assert_eq!(split("[a]", &options), ["[a]"]);
        assert_eq!(split("a", &options), ["a"]);
    }

    #[test]
    fn split_collapses_past_depth() {
        let options = DecodeOptions::new();
        assert_eq!(
            split("a[b][c][d][e][f][g][h][i]", &options),
            ["a", "[b]", "[c]", "[d]", "[e]", "[f]", "[[g][h][i]]"]
        );
        let options = DecodeOptions::new().depth(1);
        assert_eq!(split("a[b][c][d]", &options), ["a", "[b]", "[[c][d]]"]);
    }

    #[test]
    fn split_depth_zero_keeps_key_whole() {
        let options = DecodeOptions::new().depth(0).allow_dots(true);
        assert_eq!(split("a.b[c]", &options), ["a.b[c]"]);
    }

    #[test]
    fn split_strict_depth() {
        let options = DecodeOptions::new().depth(1).strict_depth(true);
        assert_eq!(
            split_key("a[b][c]", &options),
            Err(Error::DepthExceeded { max_depth: 1 })
        );
        assert_eq!(split("a[b]", &options), ["a", "[b]"]);
        // an unterminated remainder is collapsed, never rejected
        assert_eq!(split("a[b][c", &options), ["a", "[b]", "[[c]"]);
    }

    #[test]
    fn split_unterminated_and_trailing() {
        let options = DecodeOptions::new();
        assert_eq!(split("a[b", &options), ["a", "[[b]"]);
        assert_eq!(split("a[b]c", &options), ["a", "[b]", "[c]"]);
    }

    #[test]
    fn split_with_dots() {
        let options = DecodeOptions::new().allow_dots(true);
        assert_eq!(split("a.b[c].d", &options), ["a", "[b]", "[c]", "[d]"]);
        let options = DecodeOptions::new();
        assert_eq!(split("a.b", &options), ["a.b"]);
    }

    #[test]
    fn fragment_map_chain() {
        let options = DecodeOptions::new();
        let fragment = build_fragment(&split("a[b]", &options), leaf("c"), &options).unwrap();
        assert_eq!(fragment, map("a", map("b", leaf("c"))));
    }

    #[test]
    fn fragment_list_index() {
        let options = DecodeOptions::new();
        let fragment = build_fragment(&split("a[2]", &options), leaf("x"), &options).unwrap();
        assert_eq!(
            fragment,
            map(
                "a",
                ParsedValue::List(vec![ParsedValue::Omitted, ParsedValue::Omitted, leaf("x")])
            )
        );
    }

    #[test]
    fn fragment_index_past_limit_is_map_key() {
        let options = DecodeOptions::new();
        let fragment =
            build_fragment(&split("a[999999999]", &options), leaf("x"), &options).unwrap();
        assert_eq!(fragment, map("a", map("999999999", leaf("x"))));

        let fragment = build_fragment(&split("a[01]", &options), leaf("x"), &options).unwrap();
        assert_eq!(fragment, map("a", map("01", leaf("x"))));
    }

    #[test]
    fn fragment_empty_brackets() {
        let options = DecodeOptions::new();
        let fragment = build_fragment(&split("a[]", &options), leaf(""), &options).unwrap();
        assert_eq!(fragment, map("a", ParsedValue::List(vec![leaf("")])));

        let options = DecodeOptions::new().allow_empty_lists(true);
        let fragment = build_fragment(&split("a[]", &options), leaf(""), &options).unwrap();
        assert_eq!(fragment, map("a", ParsedValue::List(vec![])));
    }

    #[test]
    fn fragment_without_list_parsing() {
        let options = DecodeOptions::new().parse_lists(false);
        let fragment = build_fragment(&split("a[]", &options), leaf("b"), &options).unwrap();
        assert_eq!(fragment, map("a", map("0", leaf("b"))));
        let fragment = build_fragment(&split("a[1]", &options), leaf("b"), &options).unwrap();
        assert_eq!(fragment, map("a", map("1", leaf("b"))));
    }

    #[test]
    fn fragment_decodes_dots_in_segments() {
        let options = DecodeOptions::new().decode_dot_in_keys(true);
        let fragment =
            build_fragment(&split("name%2Eobj.first", &options), leaf("x"), &options).unwrap();
        assert_eq!(fragment, map("name.obj", map("first", leaf("x"))));
    }
}
