use pretty_assertions::assert_eq;
use qs_codec::{Charset, DecodeOptions, Duplicates, Error, Map, TokenKind, Value, decode};
use regex::Regex;
use serde_json::json;

fn value(json: serde_json::Value) -> Value {
    serde_json::from_value(json).expect("json converts into a value")
}

fn decoded(input: &str, options: &DecodeOptions) -> Value {
    Value::Map(decode(input, options).expect("decode"))
}

fn defaults(input: &str) -> Value {
    decoded(input, &DecodeOptions::new())
}

#[test]
fn simple_pairs() {
    assert_eq!(defaults("a=b&c=d"), value(json!({"a": "b", "c": "d"})));
    assert_eq!(defaults("a=b+c&d=%20e"), value(json!({"a": "b c", "d": " e"})));
    assert_eq!(defaults(""), value(json!({})));
}

#[test]
fn keys_without_values() {
    assert_eq!(defaults("a&b="), value(json!({"a": "", "b": ""})));
    let options = DecodeOptions::new().strict_null_handling(true);
    assert_eq!(decoded("a&b=", &options), value(json!({"a": null, "b": ""})));
}

#[test]
fn nested_maps() {
    assert_eq!(defaults("a[b][c]=d"), value(json!({"a": {"b": {"c": "d"}}})));
    assert_eq!(defaults("a%5Bb%5D=c"), value(json!({"a": {"b": "c"}})));
    assert_eq!(defaults("a[b]c=d"), value(json!({"a": {"b": {"c": "d"}}})));
}

#[test]
fn depth_collapses_the_remainder() {
    assert_eq!(
        defaults("a[b][c][d][e][f][g][h][i]=j"),
        value(json!({"a": {"b": {"c": {"d": {"e": {"f": {"[g][h][i]": "j"}}}}}}}))
    );

    let options = DecodeOptions::new().depth(1);
    assert_eq!(decoded("a[b][c]=d", &options), value(json!({"a": {"b": {"[c]": "d"}}})));

    let options = DecodeOptions::new().depth(0);
    assert_eq!(decoded("a[b]=c", &options), value(json!({"a[b]": "c"})));
}

#[test]
fn strict_depth_rejects_deep_keys() {
    let options = DecodeOptions::new().depth(1).strict_depth(true);
    assert_eq!(
        decode("a[b][c]=d", &options),
        Err(Error::DepthExceeded { max_depth: 1 })
    );
    // an unterminated group is not a real level
    assert_eq!(decoded("a[b][c=d", &options), value(json!({"a": {"b": {"[c": "d"}}})));
    assert_eq!(decoded("a[b]=c", &options), value(json!({"a": {"b": "c"}})));
}

#[test]
fn dot_notation() {
    let options = DecodeOptions::new().allow_dots(true);
    assert_eq!(decoded("a.b.c=d", &options), value(json!({"a": {"b": {"c": "d"}}})));
    assert_eq!(decoded("a.[b]=c", &options), value(json!({"a": {"b": "c"}})));
    assert_eq!(decoded("a[b.c]=d", &options), value(json!({"a": {"b.c": "d"}})));
    assert_eq!(defaults("a.b=c"), value(json!({"a.b": "c"})));

    let options = DecodeOptions::new().decode_dot_in_keys(true);
    assert_eq!(
        decoded("name%252Eobj.first=John&name%252Eobj.last=Doe", &options),
        value(json!({"name.obj": {"first": "John", "last": "Doe"}}))
    );
}

#[test]
fn lists() {
    assert_eq!(defaults("a[]=b&a[]=c"), value(json!({"a": ["b", "c"]})));
    assert_eq!(defaults("a[1]=c&a[0]=b"), value(json!({"a": ["b", "c"]})));
    assert_eq!(defaults("a=b&a=c"), value(json!({"a": ["b", "c"]})));
    assert_eq!(defaults("a[0]=b&a[2]=c"), value(json!({"a": ["b", "c"]})));
    assert_eq!(defaults("a[][b]=c"), value(json!({"a": [{"b": "c"}]})));

    let options = DecodeOptions::new().allow_sparse_lists(true);
    assert_eq!(decoded("a[0]=b&a[2]=c", &options), value(json!({"a": ["b", null, "c"]})));
}

#[test]
fn empty_lists() {
    assert_eq!(defaults("a[]="), value(json!({"a": [""]})));
    let options = DecodeOptions::new().allow_empty_lists(true);
    assert_eq!(decoded("a[]=&b=c", &options), value(json!({"a": [], "b": "c"})));
}

#[test]
fn list_parsing_disabled() {
    let options = DecodeOptions::new().parse_lists(false);
    assert_eq!(decoded("a[0]=b&a[1]=c", &options), value(json!({"a": {"0": "b", "1": "c"}})));
    assert_eq!(decoded("a[]=b", &options), value(json!({"a": {"0": "b"}})));
}

#[test]
fn list_ceiling() {
    assert_eq!(defaults("a[999999999]=x"), value(json!({"a": {"999999999": "x"}})));
    assert_eq!(defaults("a[21]=x"), value(json!({"a": {"21": "x"}})));
    assert_eq!(defaults("a[20]=x"), value(json!({"a": ["x"]})));

    let options = DecodeOptions::new().list_limit(2);
    assert_eq!(
        decoded("a[]=1&a[]=2&a[]=3", &options),
        value(json!({"a": {"0": "1", "1": "2", "2": "3"}}))
    );

    let options = options.throw_on_limit_exceeded(true);
    assert_eq!(
        decode("a[]=1&a[]=2&a[]=3", &options),
        Err(Error::ListLimitExceeded { limit: 2 })
    );
}

#[test]
fn mixed_notation_merges() {
    // the bare key becomes a flag entry, kept as the string "true"
    assert_eq!(defaults("a[b]=c&a=d"), value(json!({"a": {"b": "c", "d": "true"}})));
    assert_eq!(defaults("a=b&a[c]=d"), value(json!({"a": ["b", {"c": "d"}]})));
    assert_eq!(defaults("a[0]=b&a[x]=c"), value(json!({"a": {"0": "b", "x": "c"}})));
    assert_eq!(
        defaults("a[0][b]=c&a[0][d]=e"),
        value(json!({"a": [{"b": "c", "d": "e"}]}))
    );
}

#[test]
fn duplicates() {
    let input = "a=1&a=2&a=3";
    assert_eq!(defaults(input), value(json!({"a": ["1", "2", "3"]})));
    let options = DecodeOptions::new().duplicates(Duplicates::First);
    assert_eq!(decoded(input, &options), value(json!({"a": "1"})));
    let options = DecodeOptions::new().duplicates(Duplicates::Last);
    assert_eq!(decoded(input, &options), value(json!({"a": "3"})));
}

#[test]
fn comma_separated_values() {
    let options = DecodeOptions::new().comma(true);
    assert_eq!(decoded("a=b,c", &options), value(json!({"a": ["b", "c"]})));
    assert_eq!(decoded("a=b", &options), value(json!({"a": "b"})));
    assert_eq!(decoded("a[]=b,c", &options), value(json!({"a": [["b", "c"]]})));
    assert_eq!(defaults("a=b,c"), value(json!({"a": "b,c"})));
}

#[test]
fn parameter_limit() {
    let options = DecodeOptions::new().parameter_limit(1);
    assert_eq!(decoded("a=b&c=d", &options), value(json!({"a": "b"})));

    let options = options.throw_on_limit_exceeded(true);
    assert_eq!(
        decode("a=b&c=d", &options),
        Err(Error::ParameterLimitExceeded { limit: 1 })
    );
    assert_eq!(
        decode("a=b", &DecodeOptions::new().parameter_limit(0)),
        Err(Error::ParameterLimitNotPositive)
    );
}

#[test]
fn delimiters_and_prefix() {
    let options = DecodeOptions::new().delimiter(";");
    assert_eq!(decoded("a=b;c=d", &options), value(json!({"a": "b", "c": "d"})));

    let options = DecodeOptions::new().delimiter(Regex::new("[;,] *").unwrap());
    assert_eq!(decoded("a=b; c=d,e=f", &options), value(json!({"a": "b", "c": "d", "e": "f"})));

    assert_eq!(defaults("?a=b"), value(json!({"?a": "b"})));
    let options = DecodeOptions::new().ignore_query_prefix(true);
    assert_eq!(decoded("?a=b", &options), value(json!({"a": "b"})));
}

#[test]
fn charsets() {
    let latin1 = DecodeOptions::new().charset(Charset::Latin1);
    assert_eq!(decoded("a=%F8", &latin1), value(json!({"a": "ø"})));
    assert_eq!(defaults("a=%C3%B8"), value(json!({"a": "ø"})));
    // invalid UTF-8 and malformed escapes keep the whole token verbatim
    assert_eq!(defaults("a=%F8"), value(json!({"a": "%F8"})));
    assert_eq!(defaults("a=%zz%41&b=%41"), value(json!({"a": "%zz%41", "b": "A"})));
    assert_eq!(decoded("a=%zz%41", &latin1), value(json!({"a": "%zzA"})));

    let sniffing = DecodeOptions::new().charset_sentinel(true);
    assert_eq!(
        decoded("utf8=%26%2310003%3B&a=%F8", &sniffing),
        value(json!({"a": "ø"}))
    );
    assert_eq!(
        decoded("utf8=%E2%9C%93&a=%C3%B8", &sniffing.clone().charset(Charset::Latin1)),
        value(json!({"a": "ø"}))
    );
}

#[test]
fn numeric_entities_in_latin1() {
    let options = DecodeOptions::new()
        .charset(Charset::Latin1)
        .interpret_numeric_entities(true);
    assert_eq!(decoded("a=%26%239786%3B", &options), value(json!({"a": "☺"})));

    let options = DecodeOptions::new().charset(Charset::Latin1);
    assert_eq!(decoded("a=%26%239786%3B", &options), value(json!({"a": "&#9786;"})));
}

#[test]
fn decoder_hook() {
    let options = DecodeOptions::new().decoder(|token, _, kind| match kind {
        TokenKind::Key if token == "skip" => None,
        TokenKind::Key => Some(token.to_uppercase()),
        TokenKind::Value => Some(token.replace('_', " ")),
    });
    assert_eq!(
        decoded("a=b_c&skip=1&d[e]=f", &options),
        value(json!({"A": "b c", "D": {"E": "f"}}))
    );
}

#[test]
fn decode_or_default_swallows_errors() {
    let options = DecodeOptions::new().depth(1).strict_depth(true);
    assert_eq!(qs_codec::decode_or_default("a[b][c]=d", &options), Map::new());
}

#[test]
fn options_method() {
    let map = DecodeOptions::new().decode_str("a[b]=c").unwrap();
    assert_eq!(Value::Map(map), value(json!({"a": {"b": "c"}})));
}
