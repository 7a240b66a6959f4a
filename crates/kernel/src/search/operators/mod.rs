//! Operator registry.
//!
//! Operators turn `(field, value, param)` into a predicate or, for the
//! utility operators, a transformed field. Each operator answers to a
//! fixed set of aliases; the registry maps every alias to its operator
//! and is built once, then shared read-only.

mod comparison;
mod pattern;
mod relation;
mod utility;

use std::collections::HashMap;
use std::sync::Arc;

use sea_query::SimpleExpr;
use tracing::warn;

use super::error::ValidationError;
use super::expr::{EvalValue, Expression, Term, scalar_expr};
use super::params::check_params;
use super::types::Params;
use crate::model::ModelRegistry;

pub use pattern::escape_like_wildcards;

/// Everything an operator sees.
pub struct OperatorInput<'a> {
    /// The alias the caller used.
    pub alias: &'a str,
    pub field: Expression,
    pub value: EvalValue,
    pub param: &'a Params,
    pub models: &'a dyn ModelRegistry,
}

/// A named comparison or field transform.
pub trait Operator: Send + Sync {
    /// Aliases this operator is registered under.
    fn aliases(&self) -> &'static [&'static str];

    /// Keys accepted in `param`.
    fn params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Validate `param` before [`Operator::apply`] runs.
    fn check_params(&self, alias: &str, param: &Params) -> Result<(), ValidationError> {
        check_params(alias, param, self.params())
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError>;
}

/// Alias → operator table.
pub struct OperatorRegistry {
    operators: HashMap<&'static str, Arc<dyn Operator>>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    /// A registry with every built-in operator registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        comparison::register(&mut registry);
        pattern::register(&mut registry);
        relation::register(&mut registry);
        utility::register(&mut registry);
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register an operator under all of its aliases.
    pub fn register(&mut self, operator: Arc<dyn Operator>) {
        for &alias in operator.aliases() {
            if self.operators.insert(alias, operator.clone()).is_some() {
                warn!(alias, "operator alias registered twice, last registration wins");
            }
        }
    }

    pub fn get(&self, alias: &str) -> Result<&dyn Operator, ValidationError> {
        self.operators
            .get(alias)
            .map(|op| op.as_ref())
            .ok_or_else(|| ValidationError::UnknownOperator(alias.to_string()))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.operators.contains_key(alias)
    }

    /// All registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<_> = self.operators.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }

    /// Look up `input.alias`, check its params, and apply it.
    pub fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let operator = self.get(input.alias)?;
        operator.check_params(input.alias, input.param)?;
        operator.apply(input)
    }
}

impl OperatorInput<'_> {
    pub fn invalid_value(&self, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidValue {
            name: self.alias.to_string(),
            field: self.field.name.clone(),
            reason: reason.into(),
        }
    }

    /// The field as a SQL operand.
    pub fn lhs(&self) -> Result<SimpleExpr, ValidationError> {
        self.field.operand()
    }

    /// The value as one SQL operand; lists are rejected.
    pub fn single(&self) -> Result<SimpleExpr, ValidationError> {
        self.item(&self.value)
    }

    /// One element of a list value.
    pub fn item(&self, value: &EvalValue) -> Result<SimpleExpr, ValidationError> {
        match value {
            EvalValue::Scalar(scalar) => Ok(scalar_expr(scalar)),
            EvalValue::Expr(expr) => expr.operand(),
            EvalValue::List(_) => Err(self.invalid_value("must be a single value, not a list")),
        }
    }

    /// The value as a string.
    pub fn text(&self) -> Result<&str, ValidationError> {
        match &self.value {
            EvalValue::Scalar(scalar) => scalar
                .as_text()
                .ok_or_else(|| self.invalid_value("must be a string")),
            _ => Err(self.invalid_value("must be a string")),
        }
    }

    /// The value as a list.
    pub fn list(&self) -> Result<&[EvalValue], ValidationError> {
        match &self.value {
            EvalValue::List(items) => Ok(items),
            _ => Err(self.invalid_value("must be a list")),
        }
    }

    /// Wrap a SQL expression, carrying the sources of field and value.
    pub fn finish(self, expr: SimpleExpr) -> Expression {
        let mut sources = self.field.sources;
        sources.merge(&self.value.sources());
        Expression {
            term: Term::Value(expr),
            sources,
            name: self.field.name,
        }
    }
}
