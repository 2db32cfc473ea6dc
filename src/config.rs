use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::value::{Map, Value};

/// Byte charset of the percent-encoded text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1. Characters outside the charset travel as numeric
    /// entities (`&#N;`).
    Latin1,
}

/// Post-processing applied to every encoded token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// Spaces stay `%20`.
    #[default]
    Rfc3986,
    /// Spaces become `+`, and `(` `)` are left unescaped.
    Rfc1738,
}

impl Format {
    pub(crate) fn apply(self, token: String) -> String {
        match self {
            Format::Rfc3986 => token,
            Format::Rfc1738 => crate::utils::replace_encoded_space(token),
        }
    }
}

/// How lists are written when encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListFormat {
    /// Use the `a[0]=b&a[1]=c` format.
    #[default]
    Indices,
    /// Use the `a[]=b&a[]=c` format.
    Brackets,
    /// Use the `a=b&a=c` format.
    Repeat,
    /// Use the `a=b,c` format.
    Comma,
}

/// What to do when the same key appears more than once while decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Duplicates {
    /// Collect every value into a list.
    #[default]
    Combine,
    /// Keep the first value.
    First,
    /// Keep the last value.
    Last,
}

/// Whether a hook is looking at a key or a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Key,
    Value,
}

/// The separator between `key=value` pairs on input.
#[derive(Clone, Debug)]
pub enum Delimiter {
    Literal(String),
    Pattern(Regex),
}

impl Delimiter {
    /// Splits `input` into at most `limit` parts; anything beyond is dropped.
    pub(crate) fn split<'a>(&self, input: &'a str, limit: usize) -> Vec<&'a str> {
        match self {
            Delimiter::Literal(d) if d.is_empty() => input
                .char_indices()
                .map(|(i, c)| &input[i..i + c.len_utf8()])
                .take(limit)
                .collect(),
            Delimiter::Literal(d) => input.split(d.as_str()).take(limit).collect(),
            Delimiter::Pattern(re) => re.split(input).take(limit).collect(),
        }
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Literal("&".to_owned())
    }
}

impl From<&str> for Delimiter {
    fn from(d: &str) -> Self {
        Delimiter::Literal(d.to_owned())
    }
}

impl From<char> for Delimiter {
    fn from(d: char) -> Self {
        Delimiter::Literal(d.to_string())
    }
}

impl From<Regex> for Delimiter {
    fn from(re: Regex) -> Self {
        Delimiter::Pattern(re)
    }
}

/// Replaces the default token decoder. Returning `None` for a key skips the
/// pair; returning `None` for a value yields `Null`.
pub type DecoderFn = Arc<dyn Fn(&str, Charset, TokenKind) -> Option<String> + Send + Sync>;

/// Replaces the default token encoder.
pub type EncoderFn = Arc<dyn Fn(&str, Charset, TokenKind, Format) -> String + Send + Sync>;

/// Orders sibling keys while encoding.
pub type SortFn = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Renders dates while encoding.
pub type DateSerializerFn = Arc<dyn Fn(&DateTime<Utc>) -> String + Send + Sync>;

/// Called with the key prefix and the value of every node while encoding.
pub type FilterFn = Arc<dyn Fn(&str, &Value) -> Filtered + Send + Sync>;

/// Outcome of a [`FilterFn`].
#[derive(Clone, Debug, PartialEq)]
pub enum Filtered {
    /// Encode the value unchanged.
    Keep,
    /// Encode this value instead; `Value::Omitted` drops the key.
    Replace(Value),
}

/// Restricts what the encoder visits.
#[derive(Clone)]
pub enum Filter {
    Function(FilterFn),
    /// Only these keys (or list indices) are visited, at every level.
    Keys(Vec<String>),
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Function(_) => f.write_str("Function(..)"),
            Filter::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
        }
    }
}

fn hook<T>(h: &Option<T>) -> &'static str {
    if h.is_some() { "Some(..)" } else { "None" }
}

/// Configuration for decoding a querystring into a [`Map`].
///
/// ## Nesting Depth
///
/// The `depth` parameter controls how many bracket groups of a key are
/// expanded into nested maps. This is important for preventing
/// denial-of-service attacks from maliciously crafted inputs with excessive
/// nesting. Whatever lies beyond the limit is kept as one literal key.
/// A `depth` of 0 disables nesting entirely.
///
/// Default value: `depth = 5`
///
/// ```
/// use qs_codec::{DecodeOptions, Value};
///
/// let options = DecodeOptions::new().depth(0);
/// let map = options.decode_str("a[b][c]=1").unwrap();
/// assert_eq!(map["a[b][c]"], Value::from("1"));
///
/// let options = DecodeOptions::new().depth(10);
/// let map = options.decode_str("a[b][c]=1").unwrap();
/// assert_eq!(map["a"].get("b").unwrap().get("c").unwrap(), &Value::from("1"));
/// ```
///
/// ## List Limit
///
/// Indices above `list_limit` never allocate list storage: `a[1000]=x`
/// decodes to a map keyed by `"1000"`. Lists that grow past the limit
/// through `[]` appends or duplicate keys are turned into index-keyed maps.
#[derive(Clone)]
pub struct DecodeOptions {
    pub(crate) delimiter: Delimiter,
    pub(crate) ignore_query_prefix: bool,
    pub(crate) charset: Charset,
    pub(crate) charset_sentinel: bool,
    pub(crate) allow_dots: bool,
    pub(crate) decode_dot_in_keys: bool,
    pub(crate) allow_empty_lists: bool,
    pub(crate) allow_sparse_lists: bool,
    pub(crate) list_limit: usize,
    pub(crate) depth: usize,
    pub(crate) strict_depth: bool,
    pub(crate) parameter_limit: usize,
    pub(crate) throw_on_limit_exceeded: bool,
    pub(crate) duplicates: Duplicates,
    pub(crate) parse_lists: bool,
    pub(crate) comma: bool,
    pub(crate) interpret_numeric_entities: bool,
    pub(crate) strict_null_handling: bool,
    pub(crate) decoder: Option<DecoderFn>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self {
            delimiter: Delimiter::default(),
            ignore_query_prefix: false,
            charset: Charset::Utf8,
            charset_sentinel: false,
            allow_dots: false,
            decode_dot_in_keys: false,
            allow_empty_lists: false,
            allow_sparse_lists: false,
            list_limit: 20,
            depth: 5,
            strict_depth: false,
            parameter_limit: 1000,
            throw_on_limit_exceeded: false,
            duplicates: Duplicates::Combine,
            parse_lists: true,
            comma: false,
            interpret_numeric_entities: false,
            strict_null_handling: false,
            decoder: None,
        }
    }

    /// Separator between pairs, a literal string or a [`Regex`].
    pub fn delimiter(mut self, delimiter: impl Into<Delimiter>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Strips a leading `?` before parsing.
    pub fn ignore_query_prefix(mut self, ignore_query_prefix: bool) -> Self {
        self.ignore_query_prefix = ignore_query_prefix;
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Honors a leading `utf8=✓` pair that announces the charset.
    pub fn charset_sentinel(mut self, charset_sentinel: bool) -> Self {
        self.charset_sentinel = charset_sentinel;
        self
    }

    /// Treats `a.b` like `a[b]`.
    pub fn allow_dots(mut self, allow_dots: bool) -> Self {
        self.allow_dots = allow_dots;
        self
    }

    /// Turns `%2E` inside key segments back into `.`. Implies `allow_dots`.
    pub fn decode_dot_in_keys(mut self, decode_dot_in_keys: bool) -> Self {
        self.decode_dot_in_keys = decode_dot_in_keys;
        self
    }

    /// Decodes `a[]=` as an empty list rather than a list holding `""`.
    pub fn allow_empty_lists(mut self, allow_empty_lists: bool) -> Self {
        self.allow_empty_lists = allow_empty_lists;
        self
    }

    /// Keeps holes of indexed lists as `Null` instead of closing them up.
    pub fn allow_sparse_lists(mut self, allow_sparse_lists: bool) -> Self {
        self.allow_sparse_lists = allow_sparse_lists;
        self
    }

    /// Highest list index (and longest list) that is decoded as a list.
    /// Default is 20.
    pub fn list_limit(mut self, list_limit: usize) -> Self {
        self.list_limit = list_limit;
        self
    }

    /// Maximum number of bracket groups expanded per key. Default is 5.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Fails with [`Error::DepthExceeded`](crate::Error::DepthExceeded)
    /// instead of collapsing keys nested deeper than `depth`.
    pub fn strict_depth(mut self, strict_depth: bool) -> Self {
        self.strict_depth = strict_depth;
        self
    }

    /// Maximum number of pairs read from the input. Default is 1000.
    pub fn parameter_limit(mut self, parameter_limit: usize) -> Self {
        self.parameter_limit = parameter_limit;
        self
    }

    /// Fails instead of truncating when `parameter_limit` or `list_limit`
    /// is exceeded.
    pub fn throw_on_limit_exceeded(mut self, throw_on_limit_exceeded: bool) -> Self {
        self.throw_on_limit_exceeded = throw_on_limit_exceeded;
        self
    }

    pub fn duplicates(mut self, duplicates: Duplicates) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// When `false`, `[]` and `[N]` segments produce maps, never lists.
    pub fn parse_lists(mut self, parse_lists: bool) -> Self {
        self.parse_lists = parse_lists;
        self
    }

    /// Splits values on `,` into lists.
    pub fn comma(mut self, comma: bool) -> Self {
        self.comma = comma;
        self
    }

    /// Decodes `&#N;` entities in Latin-1 input.
    pub fn interpret_numeric_entities(mut self, interpret_numeric_entities: bool) -> Self {
        self.interpret_numeric_entities = interpret_numeric_entities;
        self
    }

    /// Decodes a key without `=` as `Null` instead of `""`.
    pub fn strict_null_handling(mut self, strict_null_handling: bool) -> Self {
        self.strict_null_handling = strict_null_handling;
        self
    }

    pub fn decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(&str, Charset, TokenKind) -> Option<String> + Send + Sync + 'static,
    {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub(crate) fn dots_enabled(&self) -> bool {
        self.allow_dots || self.decode_dot_in_keys
    }

    /// Decodes `input` using these options.
    pub fn decode_str(&self, input: &str) -> Result<Map> {
        crate::de::decode(input, self)
    }

    /// Decodes `input` and deserializes the result into `T`.
    pub fn deserialize_str<T: DeserializeOwned>(&self, input: &str) -> Result<T> {
        crate::de::from_value(Value::Map(self.decode_str(input)?))
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("delimiter", &self.delimiter)
            .field("ignore_query_prefix", &self.ignore_query_prefix)
            .field("charset", &self.charset)
            .field("charset_sentinel", &self.charset_sentinel)
            .field("allow_dots", &self.allow_dots)
            .field("decode_dot_in_keys", &self.decode_dot_in_keys)
            .field("allow_empty_lists", &self.allow_empty_lists)
            .field("allow_sparse_lists", &self.allow_sparse_lists)
            .field("list_limit", &self.list_limit)
            .field("depth", &self.depth)
            .field("strict_depth", &self.strict_depth)
            .field("parameter_limit", &self.parameter_limit)
            .field("throw_on_limit_exceeded", &self.throw_on_limit_exceeded)
            .field("duplicates", &self.duplicates)
            .field("parse_lists", &self.parse_lists)
            .field("comma", &self.comma)
            .field("interpret_numeric_entities", &self.interpret_numeric_entities)
            .field("strict_null_handling", &self.strict_null_handling)
            .field("decoder", &hook(&self.decoder))
            .finish()
    }
}

/// Configuration for encoding a [`Value`] into a querystring.
///
/// By default keys and values are percent-encoded per RFC 3986, so nested
/// keys come out as `a%5Bb%5D=c`. Use `encode_values_only(true)` to keep
/// brackets readable:
///
/// ```
/// use qs_codec::{EncodeOptions, ListFormat, Value};
///
/// let value: Value = [("a", Value::List(vec!["b".into(), "c".into()]))]
///     .into_iter()
///     .collect();
/// let options = EncodeOptions::new().encode_values_only(true);
/// assert_eq!(options.encode_value(&value).unwrap(), "a[0]=b&a[1]=c");
///
/// let options = options.list_format(ListFormat::Brackets);
/// assert_eq!(options.encode_value(&value).unwrap(), "a[]=b&a[]=c");
/// ```
#[derive(Clone)]
pub struct EncodeOptions {
    pub(crate) delimiter: String,
    pub(crate) add_query_prefix: bool,
    pub(crate) charset: Charset,
    pub(crate) charset_sentinel: bool,
    pub(crate) allow_dots: bool,
    pub(crate) encode_dot_in_keys: bool,
    pub(crate) allow_empty_lists: bool,
    pub(crate) list_format: ListFormat,
    pub(crate) comma_round_trip: bool,
    pub(crate) encode: bool,
    pub(crate) encode_values_only: bool,
    pub(crate) format: Format,
    pub(crate) skip_nulls: bool,
    pub(crate) strict_null_handling: bool,
    pub(crate) sort: Option<SortFn>,
    pub(crate) filter: Option<Filter>,
    pub(crate) encoder: Option<EncoderFn>,
    pub(crate) date_serializer: Option<DateSerializerFn>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self {
            delimiter: "&".to_owned(),
            add_query_prefix: false,
            charset: Charset::Utf8,
            charset_sentinel: false,
            allow_dots: false,
            encode_dot_in_keys: false,
            allow_empty_lists: false,
            list_format: ListFormat::Indices,
            comma_round_trip: false,
            encode: true,
            encode_values_only: false,
            format: Format::Rfc3986,
            skip_nulls: false,
            strict_null_handling: false,
            sort: None,
            filter: None,
            encoder: None,
            date_serializer: None,
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Prepends `?` to non-empty output.
    pub fn add_query_prefix(mut self, add_query_prefix: bool) -> Self {
        self.add_query_prefix = add_query_prefix;
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Prepends a `utf8=✓` pair announcing the charset.
    pub fn charset_sentinel(mut self, charset_sentinel: bool) -> Self {
        self.charset_sentinel = charset_sentinel;
        self
    }

    /// Writes nested keys as `a.b` instead of `a[b]`.
    pub fn allow_dots(mut self, allow_dots: bool) -> Self {
        self.allow_dots = allow_dots;
        self
    }

    /// Writes literal dots inside keys as `%2E`. Implies `allow_dots`.
    pub fn encode_dot_in_keys(mut self, encode_dot_in_keys: bool) -> Self {
        self.encode_dot_in_keys = encode_dot_in_keys;
        self
    }

    /// Writes empty lists as `a[]` instead of dropping them.
    pub fn allow_empty_lists(mut self, allow_empty_lists: bool) -> Self {
        self.allow_empty_lists = allow_empty_lists;
        self
    }

    /// Specifies how lists should be formatted. The default is
    /// [`ListFormat::Indices`].
    pub fn list_format(mut self, list_format: ListFormat) -> Self {
        self.list_format = list_format;
        self
    }

    /// With [`ListFormat::Comma`], writes one-element lists as `a[]=x` so
    /// they decode back into lists.
    pub fn comma_round_trip(mut self, comma_round_trip: bool) -> Self {
        self.comma_round_trip = comma_round_trip;
        self
    }

    /// Disables percent-encoding entirely when `false`.
    pub fn encode(mut self, encode: bool) -> Self {
        self.encode = encode;
        self
    }

    /// Percent-encodes values but writes keys verbatim.
    pub fn encode_values_only(mut self, encode_values_only: bool) -> Self {
        self.encode_values_only = encode_values_only;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Drops keys whose value is `Null`.
    pub fn skip_nulls(mut self, skip_nulls: bool) -> Self {
        self.skip_nulls = skip_nulls;
        self
    }

    /// Writes `Null` as a bare key (`a`) instead of `a=`.
    pub fn strict_null_handling(mut self, strict_null_handling: bool) -> Self {
        self.strict_null_handling = strict_null_handling;
        self
    }

    pub fn sort<F>(mut self, sort: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Arc::new(sort));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Shorthand for [`Filter::Function`].
    pub fn filter_fn<F>(self, filter: F) -> Self
    where
        F: Fn(&str, &Value) -> Filtered + Send + Sync + 'static,
    {
        self.filter(Filter::Function(Arc::new(filter)))
    }

    /// Shorthand for [`Filter::Keys`].
    pub fn filter_keys<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.filter(Filter::Keys(keys.into_iter().map(Into::into).collect()))
    }

    pub fn encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&str, Charset, TokenKind, Format) -> String + Send + Sync + 'static,
    {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    pub fn date_serializer<F>(mut self, date_serializer: F) -> Self
    where
        F: Fn(&DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.date_serializer = Some(Arc::new(date_serializer));
        self
    }

    pub(crate) fn dots_enabled(&self) -> bool {
        self.allow_dots || self.encode_dot_in_keys
    }

    /// Encodes `value` using these options.
    pub fn encode_value(&self, value: &Value) -> Result<String> {
        crate::ser::encode(value, self)
    }

    /// Converts `value` with serde and encodes the result.
    pub fn serialize_string<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        self.encode_value(&crate::ser::to_value(value)?)
    }
}

impl fmt::Debug for EncodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeOptions")
            .field("delimiter", &self.delimiter)
            .field("add_query_prefix", &self.add_query_prefix)
            .field("charset", &self.charset)
            .field("charset_sentinel", &self.charset_sentinel)
            .field("allow_dots", &self.allow_dots)
            .field("encode_dot_in_keys", &self.encode_dot_in_keys)
            .field("allow_empty_lists", &self.allow_empty_lists)
            .field("list_format", &self.list_format)
            .field("comma_round_trip", &self.comma_round_trip)
            .field("encode", &self.encode)
            .field("encode_values_only", &self.encode_values_only)
            .field("format", &self.format)
            .field("skip_nulls", &self.skip_nulls)
            .field("strict_null_handling", &self.strict_null_handling)
            .field("sort", &hook(&self.sort))
            .field("filter", &self.filter)
            .field("encoder", &hook(&self.encoder))
            .field("date_serializer", &hook(&self.date_serializer))
            .finish()
    }
}
