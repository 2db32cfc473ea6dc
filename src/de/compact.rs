//! Conversion of the merged tree into the public [`Value`] model.
//!
//! Holes left by indexed assignment are closed up (or kept as `Null` with
//! `allow_sparse_lists`), and overflow maps become plain maps.

use std::vec;

use indexmap::map;

use crate::config::DecodeOptions;
use crate::value::{Map, Value};

use super::parse::{Node, ParsedMap, ParsedValue};

enum Children {
    List(vec::IntoIter<ParsedValue>),
    Map(map::IntoIter<String, ParsedValue>),
}

enum Built {
    List(Vec<Value>),
    Map(Map),
}

/// A container being converted: its remaining children and what has been
/// built from the others.
struct Frame {
    key: Option<String>,
    children: Children,
    built: Built,
}

impl Frame {
    fn list(key: Option<String>, items: Vec<ParsedValue>) -> Self {
        Frame {
            key,
            built: Built::List(Vec::with_capacity(items.len())),
            children: Children::List(items.into_iter()),
        }
    }

    fn map(key: Option<String>, entries: ParsedMap) -> Self {
        Frame {
            key,
            built: Built::Map(Map::with_capacity(entries.len())),
            children: Children::Map(entries.into_iter()),
        }
    }

    fn next_child(&mut self) -> Option<(Option<String>, ParsedValue)> {
        match &mut self.children {
            Children::List(items) => items.next().map(|v| (None, v)),
            Children::Map(entries) => entries.next().map(|(k, v)| (Some(k), v)),
        }
    }

    fn push(&mut self, key: Option<String>, value: Value, sparse: bool) {
        match &mut self.built {
            Built::List(list) => match value {
                Value::Omitted if sparse => list.push(Value::Null),
                Value::Omitted => {}
                value => list.push(value),
            },
            Built::Map(map) => {
                if !value.is_omitted() {
                    map.insert(key.unwrap_or_default(), value);
                }
            }
        }
    }

    fn finish(self) -> (Option<String>, Value) {
        let value = match self.built {
            Built::List(list) => Value::List(list),
            Built::Map(map) => Value::Map(map),
        };
        (self.key, value)
    }
}

fn compact_value(root: ParsedValue, sparse: bool) -> Value {
    let mut stack: Vec<Frame> = Vec::new();
    let mut next = Some((None, root));

    loop {
        let finished = match next.take() {
            Some((key, value)) => match value.into_node() {
                Node::List(items) => {
                    stack.push(Frame::list(key, items));
                    None
                }
                Node::Map(entries) | Node::Overflow(entries, _) => {
                    stack.push(Frame::map(key, entries));
                    None
                }
                Node::Omitted => Some((key, Value::Omitted)),
                Node::Null => Some((key, Value::Null)),
                Node::String(s) => Some((key, Value::String(s))),
            },
            None => {
                let child = match stack.last_mut() {
                    Some(frame) => frame.next_child(),
                    None => return Value::Omitted,
                };
                match child {
                    Some(child) => {
                        next = Some(child);
                        None
                    }
                    None => stack.pop().map(Frame::finish),
                }
            }
        };

        if let Some((key, value)) = finished {
            match stack.last_mut() {
                Some(parent) => parent.push(key, value, sparse),
                None => return value,
            }
        }
    }
}

/// Converts the merged top-level map into the public model.
pub(crate) fn compact(root: ParsedMap, options: &DecodeOptions) -> Map {
    let mut out = Map::with_capacity(root.len());
    for (key, value) in root {
        let value = compact_value(value, options.allow_sparse_lists);
        if !value.is_omitted() {
            out.insert(key, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(value: &str) -> ParsedValue {
        ParsedValue::String(value.to_owned())
    }

    #[test]
    fn holes_are_closed_up() {
        let root = ParsedMap::from([(
            "a".to_owned(),
            ParsedValue::List(vec![ParsedValue::Omitted, s("b"), ParsedValue::Omitted, s("c")]),
        )]);
        let map = compact(root, &DecodeOptions::new());
        assert_eq!(map["a"], Value::List(vec!["b".into(), "c".into()]));
    }

    #[test]
    fn sparse_lists_keep_holes_as_null() {
        let root = ParsedMap::from([(
            "a".to_owned(),
            ParsedValue::List(vec![ParsedValue::Omitted, s("b")]),
        )]);
        let map = compact(root, &DecodeOptions::new().allow_sparse_lists(true));
        assert_eq!(map["a"], Value::List(vec![Value::Null, "b".into()]));
    }

    #[test]
    fn overflow_becomes_map() {
        let overflow = ParsedValue::Overflow {
            entries: ParsedMap::from([("0".to_owned(), s("x")), ("21".to_owned(), s("y"))]),
            max_index: 21,
        };
        let map = compact(ParsedMap::from([("a".to_owned(), overflow)]), &DecodeOptions::new());
        let expected: Value = [("0", "x"), ("21", "y")].into_iter().collect();
        assert_eq!(map["a"], expected);
    }

    #[test]
    fn deep_tree_compacts_iteratively() {
        let mut value = s("leaf");
        for _ in 0..100_000 {
            value = ParsedValue::List(vec![value]);
        }
        let map = compact(ParsedMap::from([("a".to_owned(), value)]), &DecodeOptions::new());
        let mut current = &map["a"];
        let mut levels = 0;
        while let Value::List(list) = current {
            current = &list[0];
            levels += 1;
        }
        assert_eq!(levels, 100_000);
        assert_eq!(current, &Value::from("leaf"));
    }
}
