//! Nested querystring encoding and decoding
//!
//! Querystrings are not formally defined and loosely take the form of
//! _nested_ urlencoded queries: `a[b][0]=c&a[b][1]=d&e=f`.
//!
//! This library follows the syntax and edge-case behaviour of
//! [qs](https://github.com/ljharb/qs): bracket and dot notation, indexed,
//! bracketed, repeated and comma-separated lists, UTF-8 and Latin-1
//! charsets including the `utf8=✓` sentinel, and the limits that keep
//! hostile input cheap to process.
//!
//! ## Model
//!
//! Decoding produces an ordered [`Map`] of [`Value`]s and encoding consumes
//! one. Decoded leaves are always strings; typed data can be handed to the
//! encoder as numbers, booleans, dates or bytes. [`SharedValue`] handles let
//! a value alias (or contain) itself, and the encoder detects such cycles.
//!
//! All behaviour is configured with [`DecodeOptions`] and [`EncodeOptions`],
//! both built with chainable setters.
//!
//! ```
//! use qs_codec::{decode, encode, DecodeOptions, EncodeOptions, Value};
//!
//! let map = decode("a[b]=c&a[d][]=e", &DecodeOptions::new()).unwrap();
//! assert_eq!(map["a"].get("b"), Some(&Value::from("c")));
//!
//! let options = EncodeOptions::new().encode_values_only(true);
//! assert_eq!(encode(&Value::Map(map), &options).unwrap(), "a[b]=c&a[d][0]=e");
//! ```
//!
//! ## Serde
//!
//! Structs and maps can be converted directly with [`from_str`] and
//! [`to_string`], or with the options' `deserialize_str` and
//! `serialize_string` methods.
//!
//! ```
//! # use serde::{Deserialize, Serialize};
//! #[derive(Debug, PartialEq, Deserialize, Serialize)]
//! struct Address {
//!     city: String,
//!     postcode: String,
//! }
//!
//! #[derive(Debug, PartialEq, Deserialize, Serialize)]
//! struct QueryParams {
//!     id: u8,
//!     name: String,
//!     address: Address,
//!     phone: u32,
//!     user_ids: Vec<u8>,
//! }
//!
//! let params = QueryParams {
//!     id: 42,
//!     name: "Acme".to_string(),
//!     phone: 12345,
//!     address: Address {
//!         city: "Carrot City".to_string(),
//!         postcode: "12345".to_string(),
//!     },
//!     user_ids: vec![1, 2, 3, 4],
//! };
//! let rec_params: QueryParams = qs_codec::from_str(
//!     "name=Acme&id=42&phone=12345&address[postcode]=12345&\
//!      address[city]=Carrot+City&user_ids[0]=1&user_ids[1]=2&\
//!      user_ids[2]=3&user_ids[3]=4",
//! )
//! .unwrap();
//! assert_eq!(rec_params, params);
//!
//! let encoded = qs_codec::to_string(&params).unwrap();
//! assert_eq!(qs_codec::from_str::<QueryParams>(&encoded).unwrap(), params);
//! ```
//!
//! ## Logging
//!
//! Truncation by the configured limits, depth collapsing and detected
//! cycles are reported through [`tracing`] at `debug` and `trace` level.

mod config;
mod de;
mod error;
mod ser;
pub mod utils;
mod value;

pub use crate::config::{
    Charset, DateSerializerFn, DecodeOptions, DecoderFn, Delimiter, Duplicates, EncodeOptions,
    EncoderFn, Filter, FilterFn, Filtered, Format, ListFormat, SortFn, TokenKind,
};
#[doc(inline)]
pub use crate::de::{decode, decode_or_default, from_str, from_value};
pub use crate::error::{Error, Result};
#[doc(inline)]
pub use crate::ser::{encode, encode_or_default, to_string, to_value};
pub use crate::value::{Map, Number, SharedValue, Value};
