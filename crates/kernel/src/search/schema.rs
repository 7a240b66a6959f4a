//! Recursive-descent validation of raw search JSON.
//!
//! Turns a `serde_json::Value` into a [`SearchRequest`], coercing scalars
//! to one-element lists where the grammar expects lists. Every shape
//! mismatch is a [`ValidationError`]; unknown keys are rejected so a typo
//! never drops a clause.

use serde_json::{Map, Value};

use super::error::{ValidationError, json_kind};
use super::filter;
use super::types::{
    FieldRef, FieldSpec, FieldType, FunctionArgs, FunctionNode, JoinKind, JoinSpec, Node,
    Operand, OperatorNode, Params, Scalar, SearchRequest,
};

/// Maximum nesting of nodes and filter trees.
pub const MAX_DEPTH: usize = 32;

const SEARCH_KEYS: &[&str] = &[
    "query",
    "join",
    "filter_by",
    "group_by",
    "having",
    "order_by",
    "page",
    "page_size",
];
const OPERATOR_KEYS: &[&str] = &["field", "type", "op", "value", "param"];
const FUNCTION_KEYS: &[&str] = &["field", "type", "fn", "param"];
const JOIN_KEYS: &[&str] = &["model", "must", "param"];

/// Validate a raw search request.
pub fn validate(raw: &Value) -> Result<SearchRequest, ValidationError> {
    let map = expect_object(raw, "search")?;
    reject_unknown(map, SEARCH_KEYS, "search")?;

    let query = match map.get("query") {
        None | Some(Value::Null) => {
            return Err(ValidationError::MissingKey {
                context: "search",
                key: "query",
            });
        }
        Some(value) => parse_field_list(value, "query")?,
    };
    if query.is_empty() {
        return Err(ValidationError::InvalidShape {
            context: "query".to_string(),
            expected: "at least one field",
            found: "empty array",
        });
    }

    let join = match map.get("join") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(parse_join).collect::<Result<_, _>>()?,
        Some(single) => vec![parse_join(single)?],
    };

    Ok(SearchRequest {
        query,
        join,
        filter_by: filter::normalize(map.get("filter_by").unwrap_or(&Value::Null))?,
        group_by: optional_field_list(map, "group_by")?,
        having: filter::normalize(map.get("having").unwrap_or(&Value::Null))?,
        order_by: optional_field_list(map, "order_by")?,
        page: parse_page(map.get("page"), "page")?,
        page_size: parse_page(map.get("page_size"), "page_size")?,
    })
}

impl SearchRequest {
    /// Validate raw JSON into a request.
    pub fn from_json(raw: &Value) -> Result<Self, ValidationError> {
        validate(raw)
    }
}

fn optional_field_list(
    map: &Map<String, Value>,
    key: &'static str,
) -> Result<Vec<FieldSpec>, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => parse_field_list(value, key),
    }
}

/// A list of field specs; a single spec is coerced to a one-element list.
fn parse_field_list(value: &Value, context: &'static str) -> Result<Vec<FieldSpec>, ValidationError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| parse_field(item, FieldType::Field, context, 0))
            .collect(),
        single => Ok(vec![parse_field(single, FieldType::Field, context, 0)?]),
    }
}

fn parse_page(value: Option<&Value>, name: &'static str) -> Result<Option<u64>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(page) if page > 0 => Ok(Some(page)),
            _ => Err(ValidationError::InvalidPagination(name)),
        },
        Some(_) => Err(ValidationError::InvalidPagination(name)),
    }
}

fn parse_join(value: &Value) -> Result<JoinSpec, ValidationError> {
    let map = expect_object(value, "join")?;
    reject_unknown(map, JOIN_KEYS, "join")?;

    let model = match map.get("model") {
        Some(Value::String(raw)) => FieldRef::parse(raw)?,
        Some(other) => {
            return Err(ValidationError::InvalidShape {
                context: "join.model".to_string(),
                expected: "string",
                found: json_kind(other),
            });
        }
        None => {
            return Err(ValidationError::MissingKey {
                context: "join",
                key: "model",
            });
        }
    };
    if let FieldRef::Qualified {
        direction: Some(_), ..
    } = &model
    {
        return Err(ValidationError::InvalidJoin {
            model: model.to_string(),
            reason: "a join target cannot carry a direction marker".to_string(),
        });
    }

    let must = match map.get("must") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_node(expect_object(value, "join.must")?, 0)?),
    };

    let param = parse_params(map.get("param"), "join.param")?;
    let mut isouter = false;
    let mut full = false;
    for (key, value) in &param {
        let flag = match key.as_str() {
            "isouter" => &mut isouter,
            "full" => &mut full,
            _ => {
                return Err(ValidationError::UnexpectedParam {
                    name: "join".to_string(),
                    param: key.clone(),
                });
            }
        };
        *flag = value.as_bool().ok_or_else(|| ValidationError::InvalidParam {
            name: "join".to_string(),
            param: key.clone(),
            reason: "must be a boolean",
        })?;
    }
    let kind = match (isouter, full) {
        (_, true) => JoinKind::FullOuter,
        (true, false) => JoinKind::LeftOuter,
        (false, false) => JoinKind::Inner,
    };

    Ok(JoinSpec { model, must, kind })
}

/// Parse an object carrying `op` or `fn` into a node.
pub(crate) fn parse_node(map: &Map<String, Value>, depth: usize) -> Result<Node, ValidationError> {
    if depth > MAX_DEPTH {
        return Err(ValidationError::TooDeep(MAX_DEPTH));
    }
    match (map.contains_key("op"), map.contains_key("fn")) {
        (true, false) => Ok(Node::Operator(parse_operator_node(map, depth)?)),
        (false, true) => Ok(Node::Function(parse_function_node(map, depth)?)),
        (true, true) => Err(ValidationError::InvalidShape {
            context: "node".to_string(),
            expected: "either 'op' or 'fn'",
            found: "both",
        }),
        (false, false) => Err(ValidationError::MissingKey {
            context: "node",
            key: "op",
        }),
    }
}

/// True when an object looks like an operator or function node.
pub(crate) fn is_node(map: &Map<String, Value>) -> bool {
    map.contains_key("op") || map.contains_key("fn")
}

fn parse_operator_node(
    map: &Map<String, Value>,
    depth: usize,
) -> Result<OperatorNode, ValidationError> {
    reject_unknown(map, OPERATOR_KEYS, "operator")?;
    let field_type = parse_field_type(map.get("type"))?;
    let op = required_string(map, "op", "operator")?;
    let field = parse_field(
        required(map, "field", "operator")?,
        field_type,
        "operator.field",
        depth + 1,
    )?;
    let value = parse_operand(required(map, "value", "operator")?, depth + 1)?;
    let param = parse_params(map.get("param"), "operator.param")?;

    Ok(OperatorNode {
        field,
        field_type,
        op,
        value,
        param,
    })
}

fn parse_function_node(
    map: &Map<String, Value>,
    depth: usize,
) -> Result<FunctionNode, ValidationError> {
    reject_unknown(map, FUNCTION_KEYS, "function")?;
    let field_type = parse_field_type(map.get("type"))?;
    let func = required_string(map, "fn", "function")?;
    let field = match required(map, "field", "function")? {
        Value::Array(items) => FunctionArgs::Many(
            items
                .iter()
                .map(|item| parse_field(item, field_type, "function.field", depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        single => FunctionArgs::One(parse_field(
            single,
            field_type,
            "function.field",
            depth + 1,
        )?),
    };
    let param = parse_params(map.get("param"), "function.param")?;

    Ok(FunctionNode {
        field,
        field_type,
        func,
        param,
    })
}

/// A field: a reference (or literal under `type: plain`) or a nested node.
fn parse_field(
    value: &Value,
    field_type: FieldType,
    context: &'static str,
    depth: usize,
) -> Result<FieldSpec, ValidationError> {
    match value {
        Value::String(raw) => match field_type {
            FieldType::Field => Ok(FieldSpec::Ref(FieldRef::parse(raw)?)),
            FieldType::Plain => Ok(FieldSpec::Literal(raw.clone())),
        },
        Value::Object(map) if is_node(map) => match parse_node(map, depth)? {
            Node::Operator(node) => Ok(FieldSpec::Operator(Box::new(node))),
            Node::Function(node) => Ok(FieldSpec::Function(Box::new(node))),
        },
        other => Err(ValidationError::InvalidShape {
            context: context.to_string(),
            expected: "field reference or node",
            found: json_kind(other),
        }),
    }
}

/// An operator `value`: scalar, list, or nested node.
fn parse_operand(value: &Value, depth: usize) -> Result<Operand, ValidationError> {
    if depth > MAX_DEPTH {
        return Err(ValidationError::TooDeep(MAX_DEPTH));
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Scalar::from_json(value)
            .map(Operand::Scalar)
            .map_err(|_| ValidationError::InvalidShape {
                context: "operator.value".to_string(),
                expected: "a number within the 64-bit integer range",
                found: "an out-of-range integer",
            }),
        Value::Array(items) => Ok(Operand::List(
            items
                .iter()
                .map(|item| parse_operand(item, depth + 1))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) if is_node(map) => Ok(Operand::Node(Box::new(parse_node(map, depth)?))),
        Value::Object(_) => Err(ValidationError::InvalidShape {
            context: "operator.value".to_string(),
            expected: "scalar, array, or node",
            found: "object",
        }),
    }
}

fn parse_field_type(value: Option<&Value>) -> Result<FieldType, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(FieldType::Field),
        Some(Value::String(s)) if s == "field" => Ok(FieldType::Field),
        Some(Value::String(s)) if s == "plain" => Ok(FieldType::Plain),
        Some(other) => Err(ValidationError::InvalidShape {
            context: "type".to_string(),
            expected: "'field' or 'plain'",
            found: json_kind(other),
        }),
    }
}

fn parse_params(value: Option<&Value>, context: &'static str) -> Result<Params, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(ValidationError::InvalidShape {
            context: context.to_string(),
            expected: "object",
            found: json_kind(other),
        }),
    }
}

pub(crate) fn expect_object<'a>(
    value: &'a Value,
    context: &'static str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| ValidationError::InvalidShape {
        context: context.to_string(),
        expected: "object",
        found: json_kind(value),
    })
}

pub(crate) fn reject_unknown(
    map: &Map<String, Value>,
    allowed: &[&str],
    context: &'static str,
) -> Result<(), ValidationError> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ValidationError::UnexpectedKey {
            context,
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

fn required<'a>(
    map: &'a Map<String, Value>,
    key: &'static str,
    context: &'static str,
) -> Result<&'a Value, ValidationError> {
    map.get(key)
        .ok_or(ValidationError::MissingKey { context, key })
}

fn required_string(
    map: &Map<String, Value>,
    key: &'static str,
    context: &'static str,
) -> Result<String, ValidationError> {
    match required(map, key, context)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(ValidationError::InvalidShape {
            context: format!("{context}.{key}"),
            expected: "string",
            found: json_kind(other),
        }),
    }
}
