//! Helpers for reading node `param` mappings.

use serde_json::Value;

use super::error::ValidationError;
use super::expr::Nulls;
use super::types::Params;

/// Reject keys outside `allowed`.
pub fn check_params(name: &str, param: &Params, allowed: &[&str]) -> Result<(), ValidationError> {
    match param.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ValidationError::UnexpectedParam {
            name: name.to_string(),
            param: key.clone(),
        }),
        None => Ok(()),
    }
}

/// Boolean flag, `false` when absent or null.
pub fn bool_param(name: &str, param: &Params, key: &str) -> Result<bool, ValidationError> {
    match param.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(name, key, "must be a boolean")),
    }
}

pub fn str_param<'a>(
    name: &str,
    param: &'a Params,
    key: &str,
) -> Result<Option<&'a str>, ValidationError> {
    match param.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(name, key, "must be a string")),
    }
}

/// A single-character string, as used by `escape`.
pub fn char_param(name: &str, param: &Params, key: &str) -> Result<Option<char>, ValidationError> {
    let Some(raw) = str_param(name, param, key)? else {
        return Ok(None);
    };
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(invalid(name, key, "must be a single character")),
    }
}

/// `nulls: "first" | "last"`.
pub fn nulls_param(name: &str, param: &Params) -> Result<Option<Nulls>, ValidationError> {
    match str_param(name, param, "nulls")? {
        None => Ok(None),
        Some("first") => Ok(Some(Nulls::First)),
        Some("last") => Ok(Some(Nulls::Last)),
        Some(_) => Err(invalid(name, "nulls", "must be 'first' or 'last'")),
    }
}

fn invalid(name: &str, key: &str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidParam {
        name: name.to_string(),
        param: key.to_string(),
        reason,
    }
}
