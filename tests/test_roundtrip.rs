use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use qs_codec::{DecodeOptions, EncodeOptions, Format, ListFormat, Map, Value, decode, encode};
use serde::{Deserialize, Serialize};

/// Serializes `$data` under every list layout and percent-encoding format
/// and checks that the default decoder reads it back unchanged.
macro_rules! roundtrip_test {
    (
        $data:expr
    ) => {
        let data = &$data;

        for list_format in [ListFormat::Indices, ListFormat::Brackets, ListFormat::Repeat] {
            for format in [Format::Rfc3986, Format::Rfc1738] {
                let options = EncodeOptions::new().list_format(list_format).format(format);
                let serialized = options.serialize_string(data).expect("serialize");
                let deserialized = DecodeOptions::new()
                    .deserialize_str(serialized.as_str())
                    .expect("deserialize");
                assert_eq!(data, &deserialized, "{list_format:?} {format:?}: {serialized}");
            }
        }
    };
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
struct FlatStruct {
    a: u8,
    b: String,
}

#[test]
fn flat_struct() {
    roundtrip_test!(FlatStruct {
        a: 1,
        b: "x & y = z+1%".to_owned()
    });
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
struct Primitives {
    flag: bool,
    small: i8,
    big: u64,
    signed: i64,
    ratio: f32,
    letter: char,
}

#[test]
fn primitives() {
    roundtrip_test!(Primitives {
        flag: false,
        small: -8,
        big: u64::MAX,
        signed: i64::MIN,
        ratio: 0.25,
        letter: 'ø',
    });
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
struct Nested {
    name: String,
    inner: Inner,
    list: Vec<u16>,
    maybe: Option<Inner>,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
struct Inner {
    depth: Vec<String>,
    label: Option<String>,
}

#[test]
fn nested_struct() {
    roundtrip_test!(Nested {
        name: "[brackets] and.dots".to_owned(),
        inner: Inner {
            depth: vec!["a".to_owned(), "b c".to_owned()],
            label: Some("☺".to_owned()),
        },
        list: vec![3, 1, 2],
        maybe: None,
    });
}

#[test]
fn string_map() {
    let data: BTreeMap<String, Vec<String>> = [
        ("x".to_owned(), vec!["1".to_owned()]),
        ("y".to_owned(), vec!["2".to_owned(), "3".to_owned()]),
    ]
    .into_iter()
    .collect();
    roundtrip_test!(data);
}

#[test]
fn comma_lists_with_round_trip_marker() {
    let data = FlatList {
        items: vec!["only".to_owned()],
    };
    let options = EncodeOptions::new()
        .list_format(ListFormat::Comma)
        .comma_round_trip(true);
    let serialized = options.serialize_string(&data).unwrap();
    assert_eq!(serialized, "items%5B%5D=only");
    let decoded: FlatList = DecodeOptions::new().comma(true).deserialize_str(&serialized).unwrap();
    assert_eq!(decoded, data);
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
struct FlatList {
    items: Vec<String>,
}

#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,12}",
        "[ -~]{0,12}",
        Just(String::new()),
        Just("café ☺".to_owned()),
        Just("a[b]=c&d".to_owned()),
    ]
}

fn arb_entry() -> impl Strategy<Value = Entry> {
    prop_oneof![
        arb_text().prop_map(Entry::Text),
        prop::collection::vec(arb_text(), 1..6).prop_map(Entry::List),
        prop::collection::btree_map(arb_key(), arb_text(), 1..4).prop_map(Entry::Map),
    ]
}

fn arb_document() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(arb_key(), arb_entry(), 0..6).prop_map(|entries| {
        let map: Map = entries
            .into_iter()
            .map(|(key, entry)| {
                let value = match entry {
                    Entry::Text(text) => Value::String(text),
                    Entry::List(items) => Value::List(items.into_iter().map(Value::String).collect()),
                    Entry::Map(map) => map.into_iter().collect(),
                };
                (key, value)
            })
            .collect();
        Value::Map(map)
    })
}

proptest! {
    #[test]
    fn decode_inverts_encode(document in arb_document()) {
        for list_format in [ListFormat::Indices, ListFormat::Brackets] {
            let options = EncodeOptions::new().list_format(list_format);
            let encoded = encode(&document, &options).unwrap();
            let decoded = decode(&encoded, &DecodeOptions::new()).unwrap();
            prop_assert_eq!(Value::Map(decoded), document.clone(), "{}", encoded);
        }
    }

    #[test]
    fn dot_notation_round_trips(document in arb_document()) {
        let encoded = encode(&document, &EncodeOptions::new().allow_dots(true)).unwrap();
        let decoded = decode(&encoded, &DecodeOptions::new().allow_dots(true)).unwrap();
        prop_assert_eq!(Value::Map(decoded), document);
    }

    #[test]
    fn encoding_is_deterministic(document in arb_document()) {
        let options = EncodeOptions::new().encode_values_only(true);
        prop_assert_eq!(encode(&document, &options), encode(&document, &options));
    }

    #[test]
    fn decoding_never_fails_without_strict_limits(input in "\\PC{0,40}") {
        let options = DecodeOptions::new();
        let first = decode(&input, &options);
        prop_assert!(first.is_ok());
        prop_assert_eq!(first, decode(&input, &options));
    }
}
