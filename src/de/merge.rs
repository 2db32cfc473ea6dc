//! Deep merge of per-key fragments into the accumulated tree.
//!
//! Nested merges are driven by an explicit work stack of
//! `(slot, incoming)` pairs, so arbitrarily deep fragments never recurse.

use crate::config::DecodeOptions;
use crate::error::Result;

use super::parse::{Node, ParsedMap, ParsedValue, index_map};

/// A child of a freshly merged container that still needs a nested merge.
enum Child {
    Index(usize),
    Key(String),
}

type Pending = Vec<(Child, ParsedValue)>;

/// Merges `source` into `target` and returns the result.
pub(crate) fn merge(
    target: ParsedValue,
    source: ParsedValue,
    options: &DecodeOptions,
) -> Result<ParsedValue> {
    let mut root = target;
    let mut work: Vec<(&mut ParsedValue, ParsedValue)> = vec![(&mut root, source)];

    while let Some((slot, source)) = work.pop() {
        let target = slot.take();
        let (merged, pending) = merge_step(target, source, options)?;
        *slot = merged;
        if !pending.is_empty() {
            schedule(slot, pending, &mut work);
        }
    }

    Ok(root)
}

/// Pushes the pending child merges of `slot` onto the work stack.
fn schedule<'r>(
    slot: &'r mut ParsedValue,
    pending: Pending,
    work: &mut Vec<(&'r mut ParsedValue, ParsedValue)>,
) {
    let mut positioned: Vec<(usize, ParsedValue)> = match &*slot {
        ParsedValue::Map(map) | ParsedValue::Overflow { entries: map, .. } => pending
            .into_iter()
            .filter_map(|(child, source)| {
                let position = match child {
                    Child::Key(key) => map.get_index_of(&key),
                    Child::Index(index) => map.get_index_of(&index.to_string()),
                };
                position.map(|p| (p, source))
            })
            .collect(),
        ParsedValue::List(_) => pending
            .into_iter()
            .filter_map(|(child, source)| match child {
                Child::Index(index) => Some((index, source)),
                Child::Key(key) => key.parse().ok().map(|index| (index, source)),
            })
            .collect(),
        _ => return,
    };
    positioned.sort_by_key(|(position, _)| *position);

    match slot {
        ParsedValue::Map(map) | ParsedValue::Overflow { entries: map, .. } => {
            pair_children(map.values_mut(), positioned, work)
        }
        ParsedValue::List(list) => pair_children(list.iter_mut(), positioned, work),
        _ => {}
    }
}

fn pair_children<'r, I>(
    mut children: I,
    positioned: Vec<(usize, ParsedValue)>,
    work: &mut Vec<(&'r mut ParsedValue, ParsedValue)>,
) where
    I: Iterator<Item = &'r mut ParsedValue>,
{
    let mut next = 0;
    for (position, source) in positioned {
        if position < next {
            continue;
        }
        if let Some(child) = children.nth(position - next) {
            work.push((child, source));
        }
        next = position + 1;
    }
}

/// Appends `items` to `list`, honoring the list limit.
fn push_items(
    mut list: Vec<ParsedValue>,
    items: impl IntoIterator<Item = ParsedValue>,
    options: &DecodeOptions,
) -> Result<ParsedValue> {
    list.extend(items);
    ParsedValue::list_within_limit(list, options)
}

/// Overlays `source` onto `target` key by key; keys present in both are
/// merged later.
fn overlay(target: &mut ParsedMap, source: ParsedMap, pending: &mut Pending) {
    for (key, value) in source {
        if target.contains_key(&key) {
            pending.push((Child::Key(key), value));
        } else {
            target.insert(key, value);
        }
    }
}

/// Highest decimal key of `map` that is at least `floor`.
fn max_numeric_key(map: &ParsedMap, floor: usize) -> usize {
    map.keys()
        .filter_map(|key| key.parse::<usize>().ok())
        .fold(floor, usize::max)
}

/// Merges one level and reports the children that need a nested merge.
fn merge_step(
    target: ParsedValue,
    source: ParsedValue,
    options: &DecodeOptions,
) -> Result<(ParsedValue, Pending)> {
    let mut pending = Pending::new();

    let merged = match (target.into_node(), source.into_node()) {
        // empty sources leave the target alone
        (target, Node::Omitted | Node::Null) => target.into(),
        (target, Node::String(s)) if s.is_empty() => target.into(),
        (Node::Omitted, source) => source.into(),

        // scalar sources
        (Node::List(list), source @ Node::String(_)) => {
            push_items(list, [ParsedValue::from(source)], options)?
        }
        (Node::Map(mut map), Node::String(s)) => {
            map.insert(s, ParsedValue::String("true".to_owned()));
            ParsedValue::Map(map)
        }
        (Node::Overflow(mut entries, max_index), source @ Node::String(_)) => {
            let index = max_index + 1;
            entries.insert(index.to_string(), source.into());
            ParsedValue::Overflow {
                entries,
                max_index: index,
            }
        }
        (target @ (Node::Null | Node::String(_)), source @ Node::String(_)) => {
            push_items(vec![target.into()], [ParsedValue::from(source)], options)?
        }

        // list sources
        (Node::List(mut list), Node::List(items)) => {
            let mut appended = false;
            for (index, item) in items.into_iter().enumerate() {
                if item.is_omitted() {
                    continue;
                }
                match list.get(index) {
                    Some(existing) if !existing.is_omitted() => {
                        if existing.is_container() && item.is_container() {
                            pending.push((Child::Index(index), item));
                        } else {
                            list.push(item);
                            appended = true;
                        }
                    }
                    _ => {
                        if list.len() <= index {
                            list.resize_with(index + 1, || ParsedValue::Omitted);
                        }
                        list[index] = item;
                    }
                }
            }
            if appended {
                ParsedValue::list_within_limit(list, options)?
            } else {
                ParsedValue::List(list)
            }
        }
        (Node::Map(mut map), Node::List(items)) => {
            overlay(&mut map, index_map(items), &mut pending);
            ParsedValue::Map(map)
        }
        (Node::Overflow(mut entries, max_index), Node::List(items)) => {
            let items = index_map(items);
            let max_index = max_numeric_key(&items, max_index);
            overlay(&mut entries, items, &mut pending);
            ParsedValue::Overflow { entries, max_index }
        }
        (target @ (Node::Null | Node::String(_)), Node::List(items)) => {
            push_items(vec![target.into()], items, options)?
        }

        // map sources
        (Node::Map(mut map), Node::Map(source)) => {
            overlay(&mut map, source, &mut pending);
            ParsedValue::Map(map)
        }
        (Node::Overflow(mut entries, max_index), Node::Map(source)) => {
            let max_index = max_numeric_key(&source, max_index);
            overlay(&mut entries, source, &mut pending);
            ParsedValue::Overflow { entries, max_index }
        }
        (Node::List(list), Node::Map(source)) => {
            let mut map = index_map(list);
            overlay(&mut map, source, &mut pending);
            ParsedValue::Map(map)
        }
        (target @ (Node::Null | Node::String(_)), source @ Node::Map(_)) => {
            push_items(vec![target.into()], [ParsedValue::from(source)], options)?
        }

        // overflow sources
        (Node::Map(mut map), Node::Overflow(source, max_index)) => {
            overlay(&mut map, source, &mut pending);
            let max_index = max_numeric_key(&map, max_index);
            ParsedValue::Overflow {
                entries: map,
                max_index,
            }
        }
        (Node::List(list), Node::Overflow(source, max_index)) => {
            let mut map = index_map(list);
            overlay(&mut map, source, &mut pending);
            let max_index = max_numeric_key(&map, max_index);
            ParsedValue::Overflow {
                entries: map,
                max_index,
            }
        }
        (Node::Overflow(mut entries, max_index), Node::Overflow(source, source_max)) => {
            overlay(&mut entries, source, &mut pending);
            ParsedValue::Overflow {
                entries,
                max_index: max_index.max(source_max),
            }
        }
        (target @ (Node::Null | Node::String(_)), Node::Overflow(source, max_index)) => {
            let mut entries = ParsedMap::with_capacity(source.len() + 1);
            entries.insert("0".to_owned(), target.into());
            for (key, value) in source {
                let key = match key.parse::<usize>() {
                    Ok(index) => (index + 1).to_string(),
                    Err(_) => key,
                };
                entries.insert(key, value);
            }
            ParsedValue::Overflow {
                entries,
                max_index: max_index + 1,
            }
        }
    };

    Ok((merged, pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn s(value: &str) -> ParsedValue {
        ParsedValue::String(value.to_owned())
    }

    fn map(pairs: Vec<(&str, ParsedValue)>) -> ParsedValue {
        ParsedValue::Map(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    fn run(target: ParsedValue, source: ParsedValue) -> ParsedValue {
        merge(target, source, &DecodeOptions::new()).unwrap()
    }

    #[test]
    fn maps_merge_per_key() {
        let merged = run(
            map(vec![("a", map(vec![("b", s("1"))]))]),
            map(vec![("a", map(vec![("c", s("2"))]))]),
        );
        assert_eq!(merged, map(vec![("a", map(vec![("b", s("1")), ("c", s("2"))]))]));
    }

    #[test]
    fn scalars_collide_into_list() {
        let merged = run(map(vec![("a", s("1"))]), map(vec![("a", s("2"))]));
        assert_eq!(merged, map(vec![("a", ParsedValue::List(vec![s("1"), s("2")]))]));
    }

    #[test]
    fn map_then_scalar_marks_key() {
        let merged = run(map(vec![("b", s("1"))]), s("c"));
        assert_eq!(merged, map(vec![("b", s("1")), ("c", s("true"))]));
    }

    #[test]
    fn empty_source_keeps_target() {
        assert_eq!(run(map(vec![("b", s("1"))]), s("")), map(vec![("b", s("1"))]));
        assert_eq!(run(s("x"), ParsedValue::Null), s("x"));
    }

    #[test]
    fn lists_merge_positionally() {
        let target = ParsedValue::List(vec![s("a"), ParsedValue::Omitted]);
        let source = ParsedValue::List(vec![ParsedValue::Omitted, s("b")]);
        assert_eq!(run(target, source), ParsedValue::List(vec![s("a"), s("b")]));

        let target = ParsedValue::List(vec![s("a")]);
        let source = ParsedValue::List(vec![s("b")]);
        assert_eq!(run(target, source), ParsedValue::List(vec![s("a"), s("b")]));
    }

    #[test]
    fn list_items_that_are_maps_merge() {
        let target = ParsedValue::List(vec![map(vec![("a", s("1"))])]);
        let source = ParsedValue::List(vec![map(vec![("b", s("2"))])]);
        assert_eq!(
            run(target, source),
            ParsedValue::List(vec![map(vec![("a", s("1")), ("b", s("2"))])])
        );
    }

    #[test]
    fn list_then_map_becomes_index_map() {
        let target = ParsedValue::List(vec![s("a"), ParsedValue::Omitted, s("c")]);
        let source = map(vec![("x", s("y"))]);
        assert_eq!(
            run(target, source),
            map(vec![("0", s("a")), ("2", s("c")), ("x", s("y"))])
        );
    }

    #[test]
    fn scalar_before_overflow_shifts_indices() {
        let source = ParsedValue::Overflow {
            entries: [("0".to_owned(), s("b")), ("1".to_owned(), s("c"))]
                .into_iter()
                .collect(),
            max_index: 1,
        };
        let expected = ParsedValue::Overflow {
            entries: [
                ("0".to_owned(), s("a")),
                ("1".to_owned(), s("b")),
                ("2".to_owned(), s("c")),
            ]
            .into_iter()
            .collect(),
            max_index: 2,
        };
        assert_eq!(run(s("a"), source), expected);
    }

    #[test]
    fn appending_past_limit() {
        let options = DecodeOptions::new().list_limit(1);
        let merged = merge(ParsedValue::List(vec![s("a")]), s("b"), &options).unwrap();
        assert!(matches!(merged, ParsedValue::Overflow { max_index: 1, .. }));

        let options = options.throw_on_limit_exceeded(true);
        assert_eq!(
            merge(ParsedValue::List(vec![s("a")]), s("b"), &options),
            Err(Error::ListLimitExceeded { limit: 1 })
        );
    }

    #[test]
    fn deep_fragments_merge_without_recursion() {
        let depth = 100_000;
        let mut left = s("1");
        let mut right = s("2");
        for _ in 0..depth {
            left = map(vec![("k", left)]);
            right = map(vec![("k", right)]);
        }
        let mut merged = run(left, right);
        for _ in 0..depth {
            merged = match merged.into_node() {
                Node::Map(mut m) => m.swap_remove("k").unwrap(),
                _ => panic!("expected a map"),
            };
        }
        assert_eq!(merged, ParsedValue::List(vec![s("1"), s("2")]));
    }
}
