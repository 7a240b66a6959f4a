//! Validation errors raised while validating or compiling a search.

use thiserror::Error;

/// The single error kind of the search compiler.
///
/// Every malformed shape, unknown name, or wrongly-typed value aborts the
/// compilation with one of these; nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{context}: missing required key '{key}'")]
    MissingKey {
        context: &'static str,
        key: &'static str,
    },

    #[error("{context}: unexpected key '{key}'")]
    UnexpectedKey { context: &'static str, key: String },

    #[error("{context}: expected {expected}, got {found}")]
    InvalidShape {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("'{reference}' must be [Model].[Field]")]
    MalformedFieldRef { reference: String },

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    #[error("invalid operator '{0}'")]
    UnknownOperator(String),

    #[error("invalid function name '{0}'")]
    InvalidFunctionName(String),

    #[error("'{name}' on {field}: value {reason}")]
    InvalidValue {
        name: String,
        field: String,
        reason: String,
    },

    #[error("'{name}' does not accept parameter '{param}'")]
    UnexpectedParam { name: String, param: String },

    #[error("'{name}': parameter '{param}' {reason}")]
    InvalidParam {
        name: String,
        param: String,
        reason: &'static str,
    },

    #[error("'{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("{field}: {reason}")]
    InvalidOperand { field: String, reason: String },

    #[error("invalid connector '{0}', expected 'and' or 'or'")]
    InvalidConnector(String),

    #[error("cannot join '{model}': {reason}")]
    InvalidJoin { model: String, reason: String },

    #[error("'{0}' must be a positive integer")]
    InvalidPagination(&'static str),

    #[error("page {page} with page_size {page_size} is out of range")]
    PageOutOfRange { page: u64, page_size: u64 },

    #[error("page_size {page_size} exceeds the maximum of {max}")]
    PageSizeTooLarge { page_size: u64, max: u64 },

    #[error("nesting exceeds the maximum depth of {0}")]
    TooDeep(usize),
}

/// JSON type name, for shape errors.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
