use std::borrow::Cow;
use std::mem;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{debug, trace};

use crate::config::{Charset, DecodeOptions, Duplicates, TokenKind};
use crate::error::{Error, Result};
use crate::utils::interpret_numeric_entities;

pub(crate) mod decode;

pub(crate) type ParsedMap = IndexMap<String, ParsedValue>;

/// `utf8=✓`, percent-encoded as UTF-8.
pub(crate) const UTF8_SENTINEL: &str = "utf8=%E2%9C%93";
/// `utf8=&#10003;`, the way a Latin-1 form submits the check mark.
pub(crate) const LATIN1_SENTINEL: &str = "utf8=%26%2310003%3B";

/// An intermediate representation of the parsed query string.
///
/// The decoder builds a tree of these values before compacting it into the
/// public [`Value`](crate::Value).
///
/// - `Omitted`: a hole in a list built from an explicit index (`a[3]=x`)
/// - `Null`: a key without `=` under strict null handling
/// - `String`: leaf values containing the actual data
/// - `List`: `a[]=1&a[]=2`, `a[0]=1`, or duplicated keys
/// - `Map`: nested objects like `user[name]=John&user[age]=30`
/// - `Overflow`: a list that outgrew the list limit, kept as a map keyed by
///   decimal indices together with the highest index handed out so far
#[derive(Debug, PartialEq)]
pub(crate) enum ParsedValue {
    Omitted,
    Null,
    String(String),
    List(Vec<ParsedValue>),
    Map(ParsedMap),
    Overflow { entries: ParsedMap, max_index: usize },
}

/// Destructured view of a [`ParsedValue`].
///
/// `ParsedValue` tears itself down iteratively, which rules out moving
/// fields out of it in a `match`; `Node` carries the same data without that
/// restriction.
pub(crate) enum Node {
    Omitted,
    Null,
    String(String),
    List(Vec<ParsedValue>),
    Map(ParsedMap),
    Overflow(ParsedMap, usize),
}

impl From<Node> for ParsedValue {
    fn from(node: Node) -> Self {
        match node {
            Node::Omitted => ParsedValue::Omitted,
            Node::Null => ParsedValue::Null,
            Node::String(s) => ParsedValue::String(s),
            Node::List(list) => ParsedValue::List(list),
            Node::Map(map) => ParsedValue::Map(map),
            Node::Overflow(entries, max_index) => ParsedValue::Overflow { entries, max_index },
        }
    }
}

impl Node {
    /// The node as list items: lists are spliced, anything else is one item.
    pub(crate) fn into_items(self) -> Vec<ParsedValue> {
        match self {
            Node::List(list) => list,
            other => vec![other.into()],
        }
    }
}

impl ParsedValue {
    pub(crate) fn take(&mut self) -> ParsedValue {
        mem::replace(self, ParsedValue::Omitted)
    }

    pub(crate) fn into_node(mut self) -> Node {
        match &mut self {
            ParsedValue::Omitted => Node::Omitted,
            ParsedValue::Null => Node::Null,
            ParsedValue::String(s) => Node::String(mem::take(s)),
            ParsedValue::List(list) => Node::List(mem::take(list)),
            ParsedValue::Map(map) => Node::Map(mem::take(map)),
            ParsedValue::Overflow { entries, max_index } => {
                Node::Overflow(mem::take(entries), *max_index)
            }
        }
    }

    pub(crate) fn is_omitted(&self) -> bool {
        matches!(self, ParsedValue::Omitted)
    }

    pub(crate) fn is_container(&self) -> bool {
        matches!(
            self,
            ParsedValue::List(_) | ParsedValue::Map(_) | ParsedValue::Overflow { .. }
        )
    }

    /// Wraps `items` as a list, or as an overflow map once it holds more than
    /// `list_limit` elements.
    pub(crate) fn list_within_limit(
        items: Vec<ParsedValue>,
        options: &DecodeOptions,
    ) -> Result<ParsedValue> {
        if items.len() <= options.list_limit {
            return Ok(ParsedValue::List(items));
        }
        if options.throw_on_limit_exceeded {
            return Err(Error::ListLimitExceeded {
                limit: options.list_limit,
            });
        }
        debug!(
            len = items.len(),
            limit = options.list_limit,
            "list exceeds the list limit, falling back to an index-keyed map"
        );
        Ok(ParsedValue::Overflow {
            max_index: items.len() - 1,
            entries: index_map(items),
        })
    }
}

/// Converts list items into a map keyed by their index, skipping holes.
pub(crate) fn index_map(items: Vec<ParsedValue>) -> ParsedMap {
    items
        .into_iter()
        .enumerate()
        .filter(|(_, v)| !v.is_omitted())
        .map(|(i, v)| (i.to_string(), v))
        .collect()
}

impl Drop for ParsedValue {
    fn drop(&mut self) {
        let mut pending = match self {
            ParsedValue::List(list) if !list.is_empty() => mem::take(list),
            ParsedValue::Map(map) | ParsedValue::Overflow { entries: map, .. }
                if !map.is_empty() =>
            {
                map.drain(..).map(|(_, v)| v).collect()
            }
            _ => return,
        };
        while let Some(mut value) = pending.pop() {
            match &mut value {
                ParsedValue::List(list) => pending.append(list),
                ParsedValue::Map(map) | ParsedValue::Overflow { entries: map, .. } => {
                    pending.extend(map.drain(..).map(|(_, v)| v))
                }
                _ => {}
            }
        }
    }
}

/// Combines two values for a duplicated key: overflow maps get the new
/// value appended, everything else is concatenated into a list.
pub(crate) fn combine(
    existing: ParsedValue,
    value: ParsedValue,
    options: &DecodeOptions,
) -> Result<ParsedValue> {
    match existing.into_node() {
        Node::Overflow(mut entries, max_index) => {
            let index = max_index + 1;
            entries.insert(index.to_string(), value);
            Ok(ParsedValue::Overflow {
                entries,
                max_index: index,
            })
        }
        node => {
            let mut items = node.into_items();
            items.extend(value.into_node().into_items());
            ParsedValue::list_within_limit(items, options)
        }
    }
}

/// Rewrites percent-encoded square brackets (`%5B`, `%5D`, any case) into
/// literal ones so that encoded keys still nest.
fn decode_brackets(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let is_bracket = |i: usize| {
        bytes[i] == b'%'
            && bytes.get(i + 1) == Some(&b'5')
            && matches!(bytes.get(i + 2), Some(b'B' | b'b' | b'D' | b'd'))
    };
    if !(0..bytes.len()).any(is_bracket) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if is_bracket(i) {
            out.push_str(&input[last..i]);
            out.push(if matches!(bytes[i + 2], b'B' | b'b') { '[' } else { ']' });
            i += 3;
            last = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&input[last..]);
    Cow::Owned(out)
}

/// Runs the decoder hook, or the default percent decoder.
fn decode_token(
    token: &str,
    charset: Charset,
    kind: TokenKind,
    options: &DecodeOptions,
) -> Option<String> {
    match &options.decoder {
        Some(decoder) => decoder(token, charset, kind),
        None => Some(decode::decode(token, charset).into_owned()),
    }
}

fn decode_value(token: &str, charset: Charset, options: &DecodeOptions) -> ParsedValue {
    decode_token(token, charset, TokenKind::Value, options)
        .map_or(ParsedValue::Null, ParsedValue::String)
}

/// Decodes the raw text right of `=`, splitting comma lists first so that
/// encoded commas (`%2C`) stay inside their element.
fn parse_list_value(raw: &str, charset: Charset, options: &DecodeOptions) -> Result<ParsedValue> {
    if options.comma && raw.contains(',') {
        let items = raw
            .split(',')
            .map(|item| decode_value(item, charset, options))
            .collect();
        return ParsedValue::list_within_limit(items, options);
    }
    Ok(decode_value(raw, charset, options))
}

/// Decodes `&#N;` entities in a value; comma lists are joined first.
fn interpret_entities(value: ParsedValue) -> ParsedValue {
    match value.into_node() {
        Node::String(s) if !s.is_empty() => {
            ParsedValue::String(interpret_numeric_entities(&s).into_owned())
        }
        Node::List(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    ParsedValue::String(s) => s.as_str(),
                    _ => "",
                })
                .collect::<Vec<_>>()
                .join(",");
            ParsedValue::String(interpret_numeric_entities(&joined).into_owned())
        }
        node => node.into(),
    }
}

/// Splits the raw querystring into an ordered table of decoded keys and
/// their (not yet nested) values.
///
/// Keys are kept verbatim, so `a[b]` and `a[c]` are two separate entries at
/// this stage; duplicated keys are folded according to
/// [`DecodeOptions::duplicates`].
pub(crate) fn parse_values(input: &str, options: &DecodeOptions) -> Result<ParsedMap> {
    let input = if options.ignore_query_prefix {
        input.strip_prefix('?').unwrap_or(input)
    } else {
        input
    };
    let input = decode_brackets(input);

    let limit = options.parameter_limit;
    let mut parts = options.delimiter.split(&input, limit.saturating_add(1));
    if parts.len() > limit {
        if options.throw_on_limit_exceeded {
            return Err(Error::ParameterLimitExceeded { limit });
        }
        debug!(limit, "parameter limit reached, ignoring the remaining pairs");
        parts.truncate(limit);
    }

    let mut charset = options.charset;
    let mut skip_index = None;
    if options.charset_sentinel {
        if let Some(index) = parts.iter().position(|part| part.starts_with("utf8=")) {
            match parts[index] {
                UTF8_SENTINEL => charset = Charset::Utf8,
                LATIN1_SENTINEL => charset = Charset::Latin1,
                _ => {}
            }
            trace!(?charset, "consumed charset sentinel");
            skip_index = Some(index);
        }
    }

    let mut table = ParsedMap::new();
    for (index, part) in parts.iter().enumerate() {
        if skip_index == Some(index) {
            continue;
        }

        // prefer the `=` that closes a bracketed key over an earlier one
        let pos = match part.find("]=") {
            Some(bracket_equals) => Some(bracket_equals + 1),
            None => part.find('='),
        };

        let (key, mut value) = match pos {
            None => {
                let value = if options.strict_null_handling {
                    ParsedValue::Null
                } else {
                    ParsedValue::String(String::new())
                };
                (decode_token(part, charset, TokenKind::Key, options), value)
            }
            Some(pos) => {
                let Some(key) = decode_token(&part[..pos], charset, TokenKind::Key, options)
                else {
                    continue;
                };
                let value = parse_list_value(&part[pos + 1..], charset, options)?;
                (Some(key), value)
            }
        };
        let Some(key) = key else {
            continue;
        };

        if options.interpret_numeric_entities && charset == Charset::Latin1 {
            value = interpret_entities(value);
        }

        if part.contains("[]=") && matches!(value, ParsedValue::List(_)) {
            value = ParsedValue::List(vec![value]);
        }

        match table.entry(key) {
            Entry::Occupied(mut o) => match options.duplicates {
                Duplicates::Combine => {
                    let existing = o.get_mut().take();
                    *o.get_mut() = combine(existing, value, options)?;
                }
                Duplicates::First => {}
                Duplicates::Last => {
                    o.insert(value);
                }
            },
            Entry::Vacant(v) => {
                v.insert(value);
            }
        }
    }

    Ok(table)
}
