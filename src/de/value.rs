//! A serde `Deserializer` over a decoded [`Value`] tree.
//!
//! Decoded leaves are always strings, so every primitive request first tries
//! to parse the string (see [`StringParsingDeserializer`]). Index-keyed maps
//! produced by the list limit can still be read back as sequences.

use std::mem;

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, Deserializer, IntoDeserializer, Unexpected, Visitor};

use crate::error::{Error, Result};
use crate::value::{Map, Value, iso_date};

use super::string_parser::StringParsingDeserializer;

/// Deserializes typed data out of an owned [`Value`].
pub struct ValueDeserializer {
    value: Value,
}

impl ValueDeserializer {
    pub(crate) fn new(value: Value) -> Self {
        ValueDeserializer { value }
    }

    /// Replaces a `Shared` handle by (a clone of) the value it points to.
    fn into_resolved(self) -> Result<Value> {
        if let Value::Shared(_) = &self.value {
            return self
                .value
                .resolve()
                .cloned()
                .ok_or_else(|| Error::custom("shared values form a cycle"));
        }
        Ok(self.value)
    }

    fn is_empty_like(&self) -> bool {
        match self.value.resolve() {
            Some(Value::Null | Value::Omitted) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }
}

impl<'de> IntoDeserializer<'de, Error> for Value {
    type Deserializer = ValueDeserializer;

    fn into_deserializer(self) -> ValueDeserializer {
        ValueDeserializer::new(self)
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null | Value::Omitted => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(n) => Unexpected::Other(n.as_str()),
        Value::String(s) => Unexpected::Str(s),
        Value::Date(_) => Unexpected::Other("date"),
        Value::Bytes(b) => Unexpected::Bytes(b),
        Value::List(_) => Unexpected::Seq,
        Value::Map(_) => Unexpected::Map,
        Value::Shared(_) => Unexpected::Other("shared value"),
    }
}

fn visit_list<'de, V: Visitor<'de>>(list: Vec<Value>, visitor: V) -> Result<V::Value> {
    let mut seq = SeqDeserializer::<_, Error>::new(list.into_iter());
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

fn visit_map<'de, V: Visitor<'de>>(map: Map, visitor: V) -> Result<V::Value> {
    let entries = map
        .into_iter()
        .map(|(key, value)| (StringParsingDeserializer::<Error>::new(key), value));
    let mut access = MapDeserializer::<_, Error>::new(entries);
    let value = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(value)
}

/// Values of an index-keyed map, in index order.
fn index_map_values(map: Map) -> Vec<Value> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by_key(|(key, _)| key.parse::<usize>().unwrap_or(usize::MAX));
    entries.into_iter().map(|(_, value)| value).collect()
}

macro_rules! deserialize_scalar {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                let mut value = self.into_resolved()?;
                if let Value::String(s) = &mut value {
                    let text = mem::take(s);
                    return StringParsingDeserializer::new(text).$method(visitor);
                }
                ValueDeserializer::new(value).deserialize_any(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut value = self.into_resolved()?;
        match &mut value {
            Value::Null => visitor.visit_unit(),
            Value::Omitted => visitor.visit_none(),
            Value::Bool(b) => visitor.visit_bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                    visitor.visit_f64(f)
                } else {
                    visitor.visit_str(n.as_str())
                }
            }
            Value::String(s) => visitor.visit_string(mem::take(s)),
            Value::Date(d) => visitor.visit_string(iso_date(d)),
            Value::Bytes(b) => visitor.visit_byte_buf(mem::take(b)),
            Value::List(list) => visit_list(mem::take(list), visitor),
            Value::Map(map) => visit_map(mem::take(map), visitor),
            Value::Shared(_) => Err(Error::custom("unresolved shared value")),
        }
    }

    deserialize_scalar! {
        deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
        deserialize_f32 deserialize_f64
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    /// Typed scalars are handed over in their querystring rendering.
    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let value = self.into_resolved()?;
        match value.primitive_text() {
            Some(text) => visitor.visit_string(text),
            None => ValueDeserializer::new(value).deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut value = self.into_resolved()?;
        match &mut value {
            Value::Bytes(b) => visitor.visit_byte_buf(mem::take(b)),
            Value::String(s) => visitor.visit_byte_buf(mem::take(s).into_bytes()),
            _ => ValueDeserializer::new(value).deserialize_any(visitor),
        }
    }

    /// `Null`, `Omitted` and the empty string read as `None`.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.is_empty_like() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.is_empty_like() {
            visitor.visit_unit()
        } else {
            self.deserialize_any(visitor)
        }
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    /// Lists, index-keyed maps, and single values (as a one-element
    /// sequence) are all accepted.
    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut value = self.into_resolved()?;
        let items = match &mut value {
            Value::List(list) => Some(mem::take(list)),
            Value::Map(map) => Some(index_map_values(mem::take(map))),
            Value::Null | Value::Omitted => Some(Vec::new()),
            _ => None,
        };
        let items = items.unwrap_or_else(|| vec![value]);
        visit_list(items, visitor)
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let empty = self.is_empty_like();
        let mut value = self.into_resolved()?;
        match &mut value {
            Value::Map(map) => visit_map(mem::take(map), visitor),
            Value::List(list) => {
                let map = mem::take(list)
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect();
                visit_map(map, visitor)
            }
            _ if empty => visit_map(Map::new(), visitor),
            _ => Err(de::Error::invalid_type(unexpected(&value), &visitor)),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    /// Unit variants come from strings (`a=red`), all other variants from a
    /// single-key map (`a[rgb][0]=1`).
    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut value = self.into_resolved()?;
        match &mut value {
            Value::String(s) => visitor.visit_enum(StringParsingDeserializer::new(mem::take(s))),
            Value::Map(map) if map.len() == 1 => match map.pop() {
                Some((variant, value)) => visitor.visit_enum(EnumDeserializer { variant, value }),
                None => Err(Error::custom("expected a single-key map for an enum")),
            },
            _ => Err(de::Error::invalid_type(unexpected(&value), &visitor)),
        }
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        drop(self);
        visitor.visit_unit()
    }
}

struct EnumDeserializer {
    variant: String,
    value: Value,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer {
    type Error = Error;
    type Variant = ValueDeserializer;

    fn variant_seed<T>(self, seed: T) -> Result<(T::Value, Self::Variant)>
    where
        T: de::DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(StringParsingDeserializer::<Error>::new(self.variant))?;
        Ok((variant, ValueDeserializer::new(self.value)))
    }
}

impl<'de> de::VariantAccess<'de> for ValueDeserializer {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(self)
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn values_deserialize_through_into_deserializer() {
        let value: Value = [("a", Value::List(vec!["1".into(), "2".into()]))]
            .into_iter()
            .collect();
        let parsed =
            std::collections::BTreeMap::<String, Vec<u8>>::deserialize(value.into_deserializer())
                .unwrap();
        assert_eq!(parsed["a"], vec![1, 2]);
    }

    #[test]
    fn empty_strings_read_as_none() {
        let parsed = Option::<u8>::deserialize(Value::from("").into_deserializer()).unwrap();
        assert_eq!(parsed, None);
    }
}
