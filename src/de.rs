//! Decoding support for querystrings.
//!
//! ### An overview of the design of the decoder
//!
//! Querystrings are not ordered by key: `a[0]=1&b=2&a[1]=3` has to end up
//! with both `a` entries in one list. We therefore never try to stream the
//! input. Instead decoding is a pipeline over an intermediate tree of
//! [`ParsedValue`](parse::ParsedValue)s:
//!
//! 1. `parse` splits the input into pairs, percent-decodes them and folds
//!    duplicated keys, producing an ordered table of raw keys.
//! 2. `keys` splits every raw key into path segments (`a[b][0]` becomes
//!    `a`, `[b]`, `[0]`) and builds the nested fragment it describes.
//! 3. `merge` folds each fragment into the accumulated tree.
//! 4. `compact` converts the tree into the public [`Value`] model, closing
//!    up holes left by indexed assignment.
//!
//! Every stage is iterative, so neither deeply nested keys nor long inputs
//! can exhaust the call stack. The limits in [`DecodeOptions`] bound the
//! work done per input.
//!
//! For typed targets the resulting [`Value`] is fed through a serde
//! `Deserializer` (see `value`), which parses string leaves on demand via
//! `StringParsingDeserializer`.

mod compact;
mod keys;
mod merge;
pub(crate) mod parse;
mod string_parser;
mod value;

use serde::de;
use tracing::debug;

use crate::config::DecodeOptions;
use crate::error::{Error, Result};
use crate::value::{Map, Value};

use parse::{ParsedMap, ParsedValue};

/// Decodes a querystring into an ordered map.
///
/// ```
/// use qs_codec::{decode, DecodeOptions, Value};
///
/// let map = decode("a[b]=c&a[d][]=e&f", &DecodeOptions::new()).unwrap();
/// assert_eq!(map["a"].get("b"), Some(&Value::from("c")));
/// assert_eq!(
///     map["a"].get("d"),
///     Some(&Value::List(vec![Value::from("e")]))
/// );
/// assert_eq!(map["f"], Value::from(""));
/// ```
///
/// An empty input decodes to an empty map. The only failures are the ones
/// listed on [`Error`]; without `throw_on_limit_exceeded` and
/// `strict_depth` decoding never fails for a positive `parameter_limit`.
pub fn decode(input: &str, options: &DecodeOptions) -> Result<Map> {
    if options.parameter_limit == 0 {
        return Err(Error::ParameterLimitNotPositive);
    }
    if input.is_empty() {
        return Ok(Map::new());
    }

    let table = parse::parse_values(input, options)?;
    debug!(pairs = table.len(), "decoding querystring");

    let mut root = ParsedValue::Map(ParsedMap::new());
    for (key, value) in table {
        if key.is_empty() {
            continue;
        }
        let segments = keys::split_key(&key, options)?;
        if segments.is_empty() {
            continue;
        }
        let fragment = keys::build_fragment(&segments, value, options)?;
        root = merge::merge(root, fragment, options)?;
    }

    let root = match root.into_node() {
        parse::Node::Map(map) | parse::Node::Overflow(map, _) => map,
        _ => ParsedMap::new(),
    };
    Ok(compact::compact(root, options))
}

/// Like [`decode`], but returns an empty map instead of an error.
pub fn decode_or_default(input: &str, options: &DecodeOptions) -> Map {
    decode(input, options).unwrap_or_else(|err| {
        debug!(%err, "decoding failed, falling back to an empty map");
        Map::new()
    })
}

/// Deserializes a querystring into `T` with the default options.
///
/// ```
/// # use serde::Deserialize;
/// #[derive(Debug, Deserialize, PartialEq)]
/// struct Query {
///     name: String,
///     age: u8,
///     tags: Vec<String>,
/// }
///
/// let q: Query = qs_codec::from_str("name=Alice&age=24&tags[]=a&tags[]=b").unwrap();
/// assert_eq!(
///     q,
///     Query {
///         name: "Alice".to_owned(),
///         age: 24,
///         tags: vec!["a".to_owned(), "b".to_owned()],
///     }
/// );
/// ```
pub fn from_str<T: de::DeserializeOwned>(input: &str) -> Result<T> {
    DecodeOptions::default().deserialize_str(input)
}

/// Deserializes `T` from an already decoded (or hand-built) [`Value`].
///
/// String leaves are parsed when `T` asks for numbers or booleans, the
/// empty string reads as `None`, and index-keyed maps read as sequences.
pub fn from_value<T: de::DeserializeOwned>(value: Value) -> Result<T> {
    T::deserialize(value::ValueDeserializer::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Duplicates;
    use pretty_assertions::assert_eq;

    fn s(value: &str) -> Value {
        Value::from(value)
    }

    fn map<const N: usize>(pairs: [(&str, Value); N]) -> Value {
        pairs.into_iter().collect()
    }

    fn decoded(input: &str, options: &DecodeOptions) -> Value {
        Value::Map(decode(input, options).unwrap())
    }

    #[test]
    fn nested_keys_merge() {
        let value = decoded("a[b]=1&a[c]=2&d=3", &DecodeOptions::new());
        assert_eq!(value, map([("a", map([("b", s("1")), ("c", s("2"))])), ("d", s("3"))]));
    }

    #[test]
    fn indices_and_brackets_build_lists() {
        let value = decoded("a[1]=b&a[0]=c&x[]=1&x[]=2", &DecodeOptions::new());
        assert_eq!(
            value,
            map([
                ("a", Value::List(vec![s("c"), s("b")])),
                ("x", Value::List(vec![s("1"), s("2")])),
            ])
        );
    }

    #[test]
    fn large_index_becomes_map_key() {
        let value = decoded("a[999999999]=x", &DecodeOptions::new());
        assert_eq!(value, map([("a", map([("999999999", s("x"))]))]));
    }

    #[test]
    fn mixed_index_and_name_becomes_map() {
        let value = decoded("a[0]=b&a[x]=c", &DecodeOptions::new());
        assert_eq!(value, map([("a", map([("0", s("b")), ("x", s("c"))]))]));
    }

    #[test]
    fn scalar_then_nested_becomes_list() {
        let value = decoded("a=b&a[c]=d", &DecodeOptions::new());
        assert_eq!(value, map([("a", Value::List(vec![s("b"), map([("c", s("d"))])]))]));
    }

    #[test]
    fn duplicates_first_and_last() {
        let options = DecodeOptions::new().duplicates(Duplicates::First);
        assert_eq!(decoded("a=1&a=2", &options), map([("a", s("1"))]));
        let options = DecodeOptions::new().duplicates(Duplicates::Last);
        assert_eq!(decoded("a=1&a=2", &options), map([("a", s("2"))]));
    }

    #[test]
    fn empty_keys_are_skipped() {
        let value = decoded("=a&&b=c&[]=d", &DecodeOptions::new());
        assert_eq!(value, map([("b", s("c")), ("0", s("d"))]));
    }

    #[test]
    fn zero_parameter_limit_is_rejected() {
        let options = DecodeOptions::new().parameter_limit(0);
        assert_eq!(decode("a=b", &options), Err(Error::ParameterLimitNotPositive));
        assert_eq!(decode_or_default("a=b", &options), Map::new());
    }

    #[test]
    fn deep_keys_decode_without_recursion() {
        let depth = 50_000;
        let mut input = String::from("a");
        for _ in 0..depth {
            input.push_str("[b]");
        }
        input.push_str("=c");
        let options = DecodeOptions::new().depth(depth);
        let map = decode(&input, &options).unwrap();
        let mut current = &map["a"];
        for _ in 0..depth {
            current = current.get("b").unwrap();
        }
        assert_eq!(current, &s("c"));
    }
}
