//! The nested value tree produced by decoding and consumed by encoding.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq};

/// Insertion-ordered map of unique string keys.
pub type Map = IndexMap<String, Value>;

pub(crate) static OMITTED: Value = Value::Omitted;

/// A node of a querystring value tree.
///
/// Decoding only ever produces `Null`, `String`, `List` and `Map`. The other
/// scalar variants exist so callers can hand typed data to the encoder.
/// A bare key merged into a map (`a[b]=1&a=c`) becomes the entry
/// `c: "true"`, the string form of the flag `qs` stores there.
///
/// `Omitted` marks a key that must not render at all. It is distinct from
/// `Null`, which renders as an empty value (`a=`), and it never appears in a
/// decoded tree.
///
/// Dropping a `Value` never recurses on the call stack, so trees of any depth
/// can be released safely.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Omitted,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Map),
    /// A reference-like container handle; the only way to alias a subtree
    /// or to build a cycle.
    Shared(SharedValue),
}

impl Value {
    /// Takes the value out, leaving `Null` in its place.
    pub fn take(&mut self) -> Value {
        std::mem::replace(self, Value::Null)
    }

    /// Returns `true` for every variant that renders as a single token.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Date(_) | Value::Bytes(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, Value::Omitted)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a map entry, or a list slot when `key` is a decimal index.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::List(list) => key.parse::<usize>().ok().and_then(|i| list.get(i)),
            Value::Shared(shared) => shared.get().and_then(|v| v.get(key)),
            _ => None,
        }
    }

    /// Follows `Shared` handles to the first concrete value.
    ///
    /// An unset handle resolves to `Omitted`. Returns `None` when the handles
    /// form a cycle among themselves.
    pub(crate) fn resolve(&self) -> Option<&Value> {
        let mut current = self;
        let mut seen = Vec::new();
        while let Value::Shared(shared) = current {
            if seen.contains(&shared.id()) {
                return None;
            }
            seen.push(shared.id());
            current = shared.get().unwrap_or(&OMITTED);
        }
        Some(current)
    }

    /// Text rendering of a primitive, as the encoder writes it.
    pub(crate) fn primitive_text(&self) -> Option<String> {
        match self {
            Value::Bool(true) => Some("true".to_owned()),
            Value::Bool(false) => Some("false".to_owned()),
            Value::Number(n) => Some(n.as_str().to_owned()),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(iso_date(d)),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        let mut pending = match self {
            Value::List(list) if !list.is_empty() => std::mem::take(list),
            Value::Map(map) if !map.is_empty() => map.drain(..).map(|(_, v)| v).collect(),
            _ => return,
        };
        while let Some(mut value) = pending.pop() {
            match &mut value {
                Value::List(list) => pending.append(list),
                Value::Map(map) => pending.extend(map.drain(..).map(|(_, v)| v)),
                _ => {}
            }
            // `value` has no children left, so its own drop returns immediately
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Omitted => write!(f, "Omitted"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({})", n.as_str()),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({})", iso_date(d)),
            Value::Bytes(b) => write!(f, "Bytes({b:?})"),
            Value::List(list) => f.debug_list().entries(list.iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Shared(shared) => fmt::Debug::fmt(shared, f),
        }
    }
}

/// Default date rendering: ISO 8601 with milliseconds in UTC.
pub(crate) fn iso_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A number kept in its textual form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Number(String);

impl Number {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }

    /// Wraps already formatted numeric text without validating it.
    pub fn from_text(text: impl Into<String>) -> Self {
        Number(text.into())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! number_from_int {
    ($($ty:ty)*) => {
        $(
            impl From<$ty> for Number {
                fn from(n: $ty) -> Self {
                    let mut buffer = itoa::Buffer::new();
                    Number(buffer.format(n).to_owned())
                }
            }

            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n.into())
                }
            }
        )*
    };
}

number_from_int!(i8 i16 i32 i64 i128 isize u8 u16 u32 u64 u128 usize);

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        if n.is_nan() {
            return Number("NaN".to_owned());
        }
        if n.is_infinite() {
            let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
            return Number(text.to_owned());
        }
        // integral floats render without a fractional part, like `1` not `1.0`
        if n.fract() == 0.0 && n.abs() < 1e15 {
            return Number::from(n as i64);
        }
        let mut buffer = ryu::Buffer::new();
        Number(buffer.format_finite(n).to_owned())
    }
}

impl From<f32> for Number {
    fn from(n: f32) -> Self {
        if n.is_finite() && n.fract() != 0.0 {
            let mut buffer = ryu::Buffer::new();
            return Number(buffer.format_finite(n).to_owned());
        }
        Number::from(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(list: Vec<Value>) -> Self {
        Value::List(list)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<SharedValue> for Value {
    fn from(shared: SharedValue) -> Self {
        Value::Shared(shared)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Omitted, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A shared, write-once container handle.
///
/// Cloning the handle aliases the same container. A handle can be created
/// empty and filled later, which is how a value that contains itself is
/// built:
///
/// ```
/// use qs_codec::{SharedValue, Value};
///
/// let node = SharedValue::new();
/// let value: Value = [("self", Value::Shared(node.clone()))].into_iter().collect();
/// node.set(value).unwrap();
/// ```
///
/// Cycles built this way are never freed; they exist to exercise cycle
/// detection in the encoder.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<OnceLock<Value>>);

impl SharedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: Value) -> Self {
        let shared = Self::new();
        let _ = shared.0.set(value);
        shared
    }

    /// Fills an empty handle; returns the value back if it was already set.
    pub fn set(&self, value: Value) -> Result<(), Value> {
        self.0.set(value)
    }

    pub fn get(&self) -> Option<&Value> {
        self.0.get()
    }

    /// Identity of the underlying container.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:#x})", self.id())
    }
}

impl ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Omitted => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    serializer.serialize_i64(i)
                } else if let Some(u) = n.as_u64() {
                    serializer.serialize_u64(u)
                } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                    serializer.serialize_f64(f)
                } else {
                    serializer.serialize_str(n.as_str())
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&iso_date(d)),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Shared(shared) => match shared.get() {
                Some(value) => value.serialize(serializer),
                None => serializer.serialize_none(),
            },
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any querystring value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        de::Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut list = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            list.push(item);
        }
        Ok(Value::List(list))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = Map::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> de::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_render_like_query_strings() {
        assert_eq!(Number::from(1.0f64).as_str(), "1");
        assert_eq!(Number::from(-0.0f64).as_str(), "0");
        assert_eq!(Number::from(2.5f64).as_str(), "2.5");
        assert_eq!(Number::from(-42i32).as_str(), "-42");
        assert_eq!(Number::from(f64::NAN).as_str(), "NaN");
    }

    #[test]
    fn deep_tree_drops_without_recursion() {
        let mut value = Value::String("leaf".into());
        for _ in 0..200_000 {
            value = Value::List(vec![value]);
        }
        drop(value);

        let mut value = Value::Null;
        for _ in 0..200_000 {
            let mut map = Map::new();
            map.insert("a".to_owned(), value);
            value = Value::Map(map);
        }
        drop(value);
    }

    #[test]
    fn shared_handles_compare_by_identity() {
        let a = SharedValue::with_value(Value::from("x"));
        let b = SharedValue::with_value(Value::from("x"));
        assert_eq!(a, a.clone());
        assert!(a != b);
    }

    #[test]
    fn resolve_follows_handles() {
        let inner = SharedValue::with_value(Value::from("x"));
        let outer = Value::Shared(SharedValue::with_value(Value::Shared(inner)));
        assert_eq!(outer.resolve(), Some(&Value::from("x")));
        assert_eq!(
            Value::Shared(SharedValue::new()).resolve(),
            Some(&Value::Omitted)
        );
    }

    #[test]
    fn option_maps_to_omitted() {
        assert_eq!(Value::from(None::<i32>), Value::Omitted);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }
}
