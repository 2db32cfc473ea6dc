//! Encoding support for querystrings.
//!
//! ### An overview of the design of the encoder
//!
//! A [`Value`] is a graph rather than a tree: `Shared` handles may alias a
//! subtree or point back at one of their ancestors. The encoder walks it
//! depth first with an explicit stack of frames, so nesting depth never
//! touches the call stack. Every frame goes through three phases:
//!
//! * `Start` follows `Shared` handles, runs the filter hook and either
//!   renders a leaf token or lays out the children of a container.
//! * `Iterate` hands the next child to a new frame.
//! * `AwaitChild` waits for that child's tokens to be appended.
//!
//! The identities of the handles a frame passed through stay in an active
//! set until the frame completes. Reaching one of them again means the
//! graph is cyclic, which fails with [`Error::CyclicObject`]. Aliasing the
//! same handle in sibling positions is fine.
//!
//! Tokens are collected per frame and joined with the delimiter at the end.

pub(crate) mod encode;
mod key;
mod value;

pub use value::to_value;

use std::borrow::Cow;
use std::collections::HashSet;

use serde::ser;
use tracing::debug;

use crate::config::{Charset, EncodeOptions, Filter, Filtered, ListFormat, TokenKind};
use crate::de::parse::{LATIN1_SENTINEL, UTF8_SENTINEL};
use crate::error::{Error, Result};
use crate::value::{OMITTED, Value, iso_date};

/// Encodes a map or list into a querystring.
///
/// ```
/// use qs_codec::{encode, EncodeOptions, Value};
///
/// let value: Value = [
///     ("a", Value::from("b")),
///     ("c", [("d", "e f")].into_iter().collect()),
/// ]
/// .into_iter()
/// .collect();
/// let options = EncodeOptions::new();
/// assert_eq!(encode(&value, &options).unwrap(), "a=b&c%5Bd%5D=e%20f");
/// ```
///
/// Anything other than a map or a list at the root encodes to `""`, as
/// does a root without renderable entries. The query prefix and the charset
/// sentinel are only added to non-empty output.
pub fn encode(value: &Value, options: &EncodeOptions) -> Result<String> {
    let tokens = GraphEncoder::new(options).encode_root(value)?;
    debug!(tokens = tokens.len(), "encoded querystring");

    let joined = tokens.join(&options.delimiter);
    if joined.is_empty() {
        return Ok(joined);
    }

    let mut out = String::with_capacity(joined.len() + 24);
    if options.add_query_prefix {
        out.push('?');
    }
    if options.charset_sentinel {
        out.push_str(match options.charset {
            Charset::Utf8 => UTF8_SENTINEL,
            Charset::Latin1 => LATIN1_SENTINEL,
        });
        out.push('&');
    }
    out.push_str(&joined);
    Ok(out)
}

/// Like [`encode`], but returns an empty string instead of an error.
pub fn encode_or_default(value: &Value, options: &EncodeOptions) -> String {
    encode(value, options).unwrap_or_else(|err| {
        debug!(%err, "encoding failed, falling back to an empty string");
        String::new()
    })
}

/// Serializes a value into a querystring with the default options.
///
/// ```
/// # use serde::Serialize;
/// #[derive(Serialize)]
/// struct Query {
///     name: String,
///     age: u8,
///     occupation: String,
/// }
///
/// let q = Query {
///     name: "Alice".to_owned(),
///     age: 24,
///     occupation: "Student".to_owned(),
/// };
///
/// assert_eq!(
///     qs_codec::to_string(&q).unwrap(),
///     "name=Alice&age=24&occupation=Student"
/// );
/// ```
pub fn to_string<T: ser::Serialize + ?Sized>(input: &T) -> Result<String> {
    EncodeOptions::default().serialize_string(input)
}

enum Phase {
    Start,
    Iterate,
    AwaitChild,
}

/// One value on the walk. Frames share a single key buffer: a frame's
/// prefix is the first `end` bytes of it.
struct Frame<'a> {
    phase: Phase,
    value: Option<Cow<'a, Value>>,
    end: usize,
    encode: bool,
    /// Whether a single-key chain starting here may still take the fast path.
    chain: bool,
    /// Handles passed through on the way to `value`; released on completion.
    identities: Vec<usize>,
    /// Key segments of the children, relative to this frame's prefix.
    children: std::vec::IntoIter<(String, Cow<'a, Value>)>,
    child_encode: bool,
    child_chain: bool,
    tokens: Vec<String>,
}

impl<'a> Frame<'a> {
    fn new(value: Cow<'a, Value>, end: usize, encode: bool, chain: bool) -> Self {
        Frame {
            phase: Phase::Start,
            value: Some(value),
            end,
            encode,
            chain,
            identities: Vec::new(),
            children: Vec::new().into_iter(),
            child_encode: encode,
            child_chain: true,
            tokens: Vec::new(),
        }
    }
}

enum Step<'a> {
    Continue,
    Push(Frame<'a>),
    Finish,
}

fn child_of<'a>(parent: &Cow<'a, Value>, key: &str) -> Option<Cow<'a, Value>> {
    match parent {
        Cow::Borrowed(value) => {
            let value: &'a Value = *value;
            value.get(key).map(Cow::Borrowed)
        }
        Cow::Owned(value) => value.get(key).cloned().map(Cow::Owned),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value.resolve(), Some(Value::List(_) | Value::Map(_)))
}

fn resolves_to_null(value: &Value) -> bool {
    value.resolve().is_some_and(Value::is_null)
}

struct GraphEncoder<'o> {
    options: &'o EncodeOptions,
    active: HashSet<usize>,
}

impl<'o> GraphEncoder<'o> {
    fn new(options: &'o EncodeOptions) -> Self {
        GraphEncoder {
            options,
            active: HashSet::new(),
        }
    }

    fn encode_root<'a>(&mut self, value: &'a Value) -> Result<Vec<String>> {
        let options = self.options;
        let mut identities = Vec::new();
        let mut root = self.resolve(Cow::Borrowed(value), &mut identities)?;
        if let Some(Filter::Function(filter)) = &options.filter {
            if let Filtered::Replace(replacement) = filter("", &*root) {
                root = self.resolve(Cow::Owned(replacement), &mut identities)?;
            }
        }

        let mut keys: Vec<String> = match (&options.filter, &*root) {
            (Some(Filter::Keys(keys)), Value::List(_) | Value::Map(_)) => keys.clone(),
            (_, Value::List(list)) => (0..list.len()).map(|i| i.to_string()).collect(),
            (_, Value::Map(map)) => map.keys().cloned().collect(),
            _ => return Ok(Vec::new()),
        };
        if let Some(sort) = &options.sort {
            keys.sort_by(|a, b| sort(a.as_str(), b.as_str()));
        }

        let mut tokens = Vec::new();
        for key in keys {
            let Some(child) = child_of(&root, &key) else {
                continue;
            };
            if options.skip_nulls && resolves_to_null(&child) {
                continue;
            }
            tokens.extend(self.encode_node(child, key::root_key(&key, options))?);
        }
        Ok(tokens)
    }

    /// Encodes one top-level entry.
    fn encode_node<'a>(&mut self, value: Cow<'a, Value>, prefix: String) -> Result<Vec<String>> {
        let mut path = prefix;
        let mut stack = vec![Frame::new(value, path.len(), self.options.encode, true)];
        loop {
            let Some(frame) = stack.last_mut() else {
                return Ok(Vec::new());
            };
            let step = match frame.phase {
                Phase::Start => self.start(frame, &path)?,
                Phase::Iterate => match frame.children.next() {
                    Some((segment, child)) => {
                        frame.phase = Phase::AwaitChild;
                        path.truncate(frame.end);
                        path.push_str(&segment);
                        Step::Push(Frame::new(
                            child,
                            path.len(),
                            frame.child_encode,
                            frame.child_chain,
                        ))
                    }
                    None => Step::Finish,
                },
                Phase::AwaitChild => {
                    frame.phase = Phase::Iterate;
                    Step::Continue
                }
            };

            match step {
                Step::Continue => {}
                Step::Push(child) => stack.push(child),
                Step::Finish => {
                    let Some(done) = stack.pop() else {
                        return Ok(Vec::new());
                    };
                    for id in &done.identities {
                        self.active.remove(id);
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.tokens.extend(done.tokens),
                        None => return Ok(done.tokens),
                    }
                }
            }
        }
    }

    /// Runs the `Start` phase; `prefix` is the key of `frame`.
    fn start<'a>(&mut self, frame: &mut Frame<'a>, prefix: &str) -> Result<Step<'a>> {
        let options = self.options;
        let Some(value) = frame.value.take() else {
            return Ok(Step::Finish);
        };
        let mut value = self.resolve(value, &mut frame.identities)?;
        if let Some(Filter::Function(filter)) = &options.filter {
            if let Filtered::Replace(replacement) = filter(prefix, &*value) {
                value = self.resolve(Cow::Owned(replacement), &mut frame.identities)?;
            }
        }

        let encode = frame.encode;
        match &*value {
            Value::Omitted | Value::Shared(_) => Ok(Step::Finish),
            Value::Null if options.strict_null_handling => {
                frame.tokens.push(self.key_text(prefix, encode));
                Ok(Step::Finish)
            }
            Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Date(_)
            | Value::Bytes(_) => {
                frame.tokens.push(self.pair(prefix, &value, encode));
                Ok(Step::Finish)
            }
            Value::List(list) if list.is_empty() && options.allow_empty_lists => {
                frame.tokens.push(format!("{prefix}[]"));
                Ok(Step::Finish)
            }
            Value::List(list) if options.list_format == ListFormat::Comma => {
                if list.is_empty() {
                    return Ok(Step::Finish);
                }
                let joined = self.join_comma(list, encode);
                let segment = if options.comma_round_trip && list.len() == 1 {
                    "[]".to_owned()
                } else {
                    String::new()
                };
                let child = if joined.is_empty() {
                    Value::Null
                } else {
                    Value::String(joined)
                };
                if options.skip_nulls && child.is_null() {
                    return Ok(Step::Finish);
                }
                frame.children = vec![(segment, Cow::Owned(child))].into_iter();
                frame.child_encode = encode && !options.encode_values_only;
                frame.phase = Phase::Iterate;
                Ok(Step::Continue)
            }
            Value::List(_) | Value::Map(_) => {
                // a chain that failed here fails for every link below it too
                let single_key = matches!(&*value, Value::Map(map) if map.len() == 1);
                if frame.chain {
                    if let Some(token) = self.linear_chain(&value, prefix, encode) {
                        frame.tokens.push(token);
                        return Ok(Step::Finish);
                    }
                }
                frame.children = self.children(&value).into_iter();
                frame.child_encode = encode;
                frame.child_chain = !single_key;
                frame.phase = Phase::Iterate;
                Ok(Step::Continue)
            }
        }
    }

    /// Follows `Shared` handles, marking each one active.
    fn resolve<'a>(
        &mut self,
        value: Cow<'a, Value>,
        identities: &mut Vec<usize>,
    ) -> Result<Cow<'a, Value>> {
        if !matches!(&*value, Value::Shared(_)) {
            return Ok(value);
        }
        match value {
            Cow::Borrowed(value) => Ok(Cow::Borrowed(self.follow(value, identities)?)),
            Cow::Owned(value) => Ok(Cow::Owned(self.follow(&value, identities)?.clone())),
        }
    }

    fn follow<'v>(&mut self, mut current: &'v Value, identities: &mut Vec<usize>) -> Result<&'v Value> {
        while let Value::Shared(shared) = current {
            let id = shared.id();
            if !self.active.insert(id) {
                debug!(id, "value graph refers back to an enclosing container");
                return Err(Error::CyclicObject);
            }
            identities.push(id);
            current = shared.get().unwrap_or(&OMITTED);
        }
        Ok(current)
    }

    /// Lays out the children of a nested map or list with their key
    /// segments.
    fn children<'a>(&self, value: &Cow<'a, Value>) -> Vec<(String, Cow<'a, Value>)> {
        let options = self.options;
        let is_list = matches!(&**value, Value::List(_));
        let mut keys: Vec<String> = match (&options.filter, &**value) {
            (Some(Filter::Keys(keys)), _) => keys.clone(),
            (_, Value::List(list)) => (0..list.len()).map(|i| i.to_string()).collect(),
            (_, Value::Map(map)) => map.keys().cloned().collect(),
            _ => return Vec::new(),
        };
        // an explicit key list is visited in its own order
        let listed = matches!(options.filter, Some(Filter::Keys(_)));
        if let Some(sort) = options.sort.as_ref().filter(|_| !listed) {
            keys.sort_by(|a, b| sort(a.as_str(), b.as_str()));
        }

        let mut children = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(child) = child_of(value, &key) else {
                continue;
            };
            if options.skip_nulls && resolves_to_null(&child) {
                continue;
            }
            let segment = if is_list {
                key::list_segment(&key, options.list_format)
            } else {
                key::map_segment(&key, options)
            };
            children.push((segment, child));
        }

        // below the root, a custom encoder sees the primitives of a level
        // before its containers
        if options.sort.is_none() && options.encoder.is_some() {
            children.sort_by_key(|(_, child)| is_container(child));
        }
        children
    }

    /// Renders a chain of single-key maps ending in a primitive as a single
    /// token without laying out frames.
    fn linear_chain(&self, value: &Value, prefix: &str, encode: bool) -> Option<String> {
        let options = self.options;
        if options.filter.is_some() || options.sort.is_some() || options.encoder.is_some() {
            return None;
        }
        if !matches!(value, Value::Map(map) if map.len() == 1) {
            return None;
        }

        let mut current = value;
        let mut prefix = prefix.to_owned();
        let mut seen: Vec<usize> = Vec::new();
        loop {
            match current {
                Value::Map(map) if map.len() == 1 => {
                    let (key, child) = map.first()?;
                    prefix.push_str(&key::map_segment(key, options));
                    current = child;
                }
                Value::Shared(shared) => {
                    let id = shared.id();
                    if self.active.contains(&id) || seen.contains(&id) {
                        return None;
                    }
                    seen.push(id);
                    current = shared.get()?;
                }
                leaf if leaf.is_primitive() => return Some(self.pair(&prefix, leaf, encode)),
                _ => return None,
            }
        }
    }

    /// Joins the elements of a comma list. With `encode_values_only` every
    /// element is encoded on its own so the separating commas stay literal.
    fn join_comma(&self, list: &[Value], encode: bool) -> String {
        let encode_each = encode && self.options.encode_values_only;
        let mut joined = String::new();
        for (i, item) in list.iter().enumerate() {
            if i > 0 {
                joined.push(',');
            }
            let text = self.text_of(item.resolve().unwrap_or(&OMITTED));
            if encode_each {
                joined.push_str(&self.encode_token(&text, TokenKind::Value));
            } else {
                joined.push_str(&text);
            }
        }
        joined
    }

    fn encode_token(&self, text: &str, kind: TokenKind) -> String {
        let options = self.options;
        match &options.encoder {
            Some(encoder) => encoder(text, options.charset, kind, options.format),
            None => encode::encode_raw(text, options.charset, options.format),
        }
    }

    fn key_text(&self, prefix: &str, encode: bool) -> String {
        if encode && !self.options.encode_values_only {
            self.encode_token(prefix, TokenKind::Key)
        } else {
            prefix.to_owned()
        }
    }

    /// Text of a leaf before encoding; `Null` and containers render empty.
    fn text_of(&self, value: &Value) -> String {
        match (value, &self.options.date_serializer) {
            (Value::Date(date), Some(serialize)) => serialize(date),
            (Value::Date(date), None) => iso_date(date),
            _ => value.primitive_text().unwrap_or_default(),
        }
    }

    fn value_text(&self, value: &Value, encode: bool) -> String {
        let options = self.options;
        if !encode {
            return self.text_of(value);
        }
        match (value, &options.encoder, options.charset) {
            (Value::Bytes(bytes), None, Charset::Utf8) => encode::encode_bytes_raw(bytes, options.format),
            _ => self.encode_token(&self.text_of(value), TokenKind::Value),
        }
    }

    fn pair(&self, prefix: &str, value: &Value, encode: bool) -> String {
        let format = self.options.format;
        let key = format.apply(self.key_text(prefix, encode));
        let value = format.apply(self.value_text(value, encode));
        let mut token = String::with_capacity(key.len() + value.len() + 1);
        token.push_str(&key);
        token.push('=');
        token.push_str(&value);
        token
    }
}
