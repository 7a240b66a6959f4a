//! Filter normalization.
//!
//! Filters arrive in several shapes: a positional list `[a, o, b]` (or any
//! prefix of it), a mapping `{a, o, b}`, a bare node, or a flat list of
//! nodes meaning "all of these". Everything is coerced into one canonical
//! [`FilterTree`] before evaluation.

use serde_json::{Map, Value};

use super::error::{ValidationError, json_kind};
use super::schema::{MAX_DEPTH, is_node, parse_node, reject_unknown};
use super::types::{Connector, FilterSide, FilterTree};

const TREE_KEYS: &[&str] = &["a", "o", "b"];

/// Normalize a raw `filter_by`/`having` value.
pub fn normalize(raw: &Value) -> Result<FilterTree, ValidationError> {
    normalize_at(raw, 0)
}

/// Build a canonical tree from positional `(a, o, b)` arguments.
///
/// Missing arguments default to empty sides and `"and"`; no arguments at
/// all yield the identity tree.
pub fn make_filter(args: &[Value]) -> Result<FilterTree, ValidationError> {
    make_filter_at(args, 0)
}

fn normalize_at(raw: &Value, depth: usize) -> Result<FilterTree, ValidationError> {
    if depth > MAX_DEPTH {
        return Err(ValidationError::TooDeep(MAX_DEPTH));
    }
    match raw {
        Value::Null => Ok(FilterTree::empty()),
        Value::Array(items) if is_positional(items) => make_filter_at(items, depth),
        Value::Array(items) => conjunction(items, depth),
        Value::Object(map) if map.is_empty() => Ok(FilterTree::empty()),
        Value::Object(map) if is_node(map) => Ok(FilterTree::new(
            FilterSide::Node(parse_node(map, depth + 1)?),
            Connector::And,
            FilterSide::Empty,
        )),
        Value::Object(map) => from_mapping(map, depth),
        other => Err(shape_error("filter", other)),
    }
}

/// `[a, o, b]` or a prefix of it: at most three items, and a connector
/// (string or null) in second position when there are two or more.
fn is_positional(items: &[Value]) -> bool {
    match items {
        [] | [_] => true,
        [_, o] | [_, o, _] => matches!(o, Value::String(_) | Value::Null),
        _ => false,
    }
}

fn make_filter_at(args: &[Value], depth: usize) -> Result<FilterTree, ValidationError> {
    let (a, o, b) = match args {
        [] => (None, None, None),
        [a] => (Some(a), None, None),
        [a, o] => (Some(a), Some(o), None),
        [a, o, b] => (Some(a), Some(o), Some(b)),
        _ => {
            return Err(ValidationError::InvalidShape {
                context: "filter".to_string(),
                expected: "at most [a, o, b]",
                found: "longer list",
            });
        }
    };
    Ok(FilterTree::new(
        side(a, depth)?,
        connector(o)?,
        side(b, depth)?,
    ))
}

fn from_mapping(map: &Map<String, Value>, depth: usize) -> Result<FilterTree, ValidationError> {
    reject_unknown(map, TREE_KEYS, "filter")?;
    Ok(FilterTree::new(
        side(map.get("a"), depth)?,
        connector(map.get("o"))?,
        side(map.get("b"), depth)?,
    ))
}

/// A flat list of conditions without connectors: `n1 AND n2 AND ...`.
fn conjunction(items: &[Value], depth: usize) -> Result<FilterTree, ValidationError> {
    if let Some(text) = items.iter().find(|item| item.is_string()) {
        return Err(ValidationError::InvalidShape {
            context: "filter".to_string(),
            expected: "[a, o, b] or a list of conditions",
            found: json_kind(text),
        });
    }
    let mut tree = FilterTree::empty();
    for item in items.iter().rev() {
        let side = side(Some(item), depth)?;
        tree = if tree.is_empty() {
            FilterTree::new(side, Connector::And, FilterSide::Empty)
        } else {
            FilterTree::new(side, Connector::And, FilterSide::Tree(Box::new(tree)))
        };
    }
    Ok(tree)
}

fn side(raw: Option<&Value>, depth: usize) -> Result<FilterSide, ValidationError> {
    let Some(raw) = raw else {
        return Ok(FilterSide::Empty);
    };
    match raw {
        Value::Null => Ok(FilterSide::Empty),
        Value::Array(items) if items.is_empty() => Ok(FilterSide::Empty),
        Value::Object(map) if map.is_empty() => Ok(FilterSide::Empty),
        Value::Object(map) if is_node(map) => Ok(FilterSide::Node(parse_node(map, depth + 1)?)),
        Value::Array(_) | Value::Object(_) => Ok(FilterSide::Tree(Box::new(normalize_at(
            raw,
            depth + 1,
        )?))),
        other => Err(shape_error("filter side", other)),
    }
}

fn connector(raw: Option<&Value>) -> Result<Connector, ValidationError> {
    match raw {
        None | Some(Value::Null) => Ok(Connector::And),
        Some(Value::String(s)) => Connector::parse(s),
        Some(other) => Err(shape_error("filter connector", other)),
    }
}

fn shape_error(context: &str, found: &Value) -> ValidationError {
    ValidationError::InvalidShape {
        context: context.to_string(),
        expected: "null, list, or object",
        found: json_kind(found),
    }
}
