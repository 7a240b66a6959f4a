//! Typed search request structures.
//!
//! These are the validated form of the JSON grammar; see
//! [`crate::search::schema`] for how raw JSON becomes these types.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::error::ValidationError;
use crate::model::Direction;

/// Free-form `param` mapping attached to nodes and joins.
pub type Params = Map<String, Value>;

/// A field reference string, parsed.
///
/// `"name"` is [`FieldRef::Bare`]; `"Model.field"`, `"+Model.field"` and
/// `"-Model.field"` are [`FieldRef::Qualified`]. The direction marker is
/// only ever read from the first character of the model segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Bare(String),
    Qualified {
        direction: Option<Direction>,
        model: String,
        field: String,
    },
}

impl FieldRef {
    pub fn parse(reference: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedFieldRef {
            reference: reference.to_string(),
        };

        let Some((model, field)) = reference.split_once('.') else {
            if reference.is_empty() {
                return Err(malformed());
            }
            return Ok(Self::Bare(reference.to_string()));
        };
        if field.contains('.') {
            return Err(malformed());
        }

        let mut chars = model.chars();
        let (direction, model) = match chars.next().and_then(Direction::from_marker) {
            Some(direction) => (Some(direction), chars.as_str()),
            None => (None, model),
        };
        if model.is_empty() || field.is_empty() {
            return Err(malformed());
        }

        Ok(Self::Qualified {
            direction,
            model: model.to_string(),
            field: field.to_string(),
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare(name) => f.write_str(name),
            Self::Qualified {
                direction,
                model,
                field,
            } => {
                match direction {
                    Some(Direction::Asc) => f.write_str("+")?,
                    Some(Direction::Desc) => f.write_str("-")?,
                    None => {}
                }
                write!(f, "{model}.{field}")
            }
        }
    }
}

impl Serialize for FieldRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a node's string `field` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// A field reference resolved against the model registry.
    #[default]
    Field,
    /// A literal text value.
    Plain,
}

/// A JSON scalar carried as an operand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// A JSON scalar. Arrays and objects are refused, and so are integers
    /// outside the `i64` range rather than being rounded to a float.
    pub fn from_json(value: &Value) -> Result<Self, &'static str> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None if n.is_u64() => return Err("is out of range for a 64-bit integer"),
                None => Self::Float(n.as_f64().ok_or("is not a finite number")?),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => return Err("must be a scalar"),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The `value` of an operator node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Scalar(Scalar),
    List(Vec<Operand>),
    Node(Box<Node>),
}

/// What a node's `field` (or an item of `query`/`group_by`/`order_by`) holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Ref(FieldRef),
    Literal(String),
    Operator(Box<OperatorNode>),
    Function(Box<FunctionNode>),
}

/// A function's `field`: one argument, or a list for variadic functions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FunctionArgs {
    One(FieldSpec),
    Many(Vec<FieldSpec>),
}

impl FunctionArgs {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One comparison (or utility transform) on a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorNode {
    pub field: FieldSpec,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub op: String,
    pub value: Operand,
    pub param: Params,
}

/// One scalar or aggregate computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionNode {
    pub field: FunctionArgs,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(rename = "fn")]
    pub func: String,
    pub param: Params,
}

/// A leaf of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Operator(OperatorNode),
    Function(FunctionNode),
}

/// Boolean connector between the two sides of a filter tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(ValidationError::InvalidConnector(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// One side of a filter tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterSide {
    /// Contributes no predicate.
    #[default]
    Empty,
    Node(Node),
    Tree(Box<FilterTree>),
}

/// Canonical ternary filter `(a, o, b)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterTree {
    pub a: FilterSide,
    pub o: Connector,
    pub b: FilterSide,
}

impl FilterTree {
    /// The identity tree: no predicate on either side.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(a: FilterSide, o: Connector, b: FilterSide) -> Self {
        Self { a, o, b }
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }

    /// Positional form `[a, o, b]`, empty sides as `[]`.
    pub fn to_list_form(&self) -> serde_json::Result<Value> {
        Ok(Value::Array(vec![
            self.a.to_json(Self::to_list_form)?,
            Value::String(self.o.as_str().to_string()),
            self.b.to_json(Self::to_list_form)?,
        ]))
    }

    /// Mapping form `{"a": .., "o": .., "b": ..}`, empty sides as `[]`.
    pub fn to_mapping_form(&self) -> serde_json::Result<Value> {
        let mut map = Map::new();
        map.insert("a".to_string(), self.a.to_json(Self::to_mapping_form)?);
        map.insert("o".to_string(), Value::String(self.o.as_str().to_string()));
        map.insert("b".to_string(), self.b.to_json(Self::to_mapping_form)?);
        Ok(Value::Object(map))
    }
}

impl FilterSide {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Node(_) => false,
            Self::Tree(tree) => tree.is_empty(),
        }
    }

    fn to_json(
        &self,
        tree_form: fn(&FilterTree) -> serde_json::Result<Value>,
    ) -> serde_json::Result<Value> {
        match self {
            Self::Empty => Ok(Value::Array(Vec::new())),
            Self::Node(node) => serde_json::to_value(node),
            Self::Tree(tree) => tree_form(tree),
        }
    }
}

/// Join flavour selected by `param.isouter` / `param.full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    LeftOuter,
    FullOuter,
}

/// One entry of the `join` list.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// `Model` or `Model.relationship`.
    pub model: FieldRef,
    pub must: Option<Node>,
    pub kind: JoinKind,
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    pub query: Vec<FieldSpec>,
    pub join: Vec<JoinSpec>,
    pub filter_by: FilterTree,
    pub group_by: Vec<FieldSpec>,
    pub having: FilterTree,
    pub order_by: Vec<FieldSpec>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}
