//! Function registry.
//!
//! Same shape as the operator registry, plus a fallback: a name with no
//! registered function is forwarded to the query engine's generic
//! function call, so engine-native functions work without registration.

mod aggregate;
mod string;
mod utility;

use std::collections::HashMap;
use std::sync::Arc;

use sea_query::SimpleExpr;
use tracing::{debug, warn};

use super::engine::FunctionCaller;
use super::error::ValidationError;
use super::expr::{Expression, Sources, Term};
use super::params::check_params;
use super::types::Params;

/// Everything a function sees.
pub struct FunctionInput<'a> {
    /// The name the caller used.
    pub name: &'a str,
    pub args: Vec<Expression>,
    pub param: &'a Params,
    pub caller: &'a dyn FunctionCaller,
}

/// A named scalar or aggregate computation.
pub trait Function: Send + Sync {
    fn aliases(&self) -> &'static [&'static str];

    fn params(&self) -> &'static [&'static str] {
        &[]
    }

    fn apply(&self, input: FunctionInput<'_>) -> Result<Expression, ValidationError>;
}

/// Alias → function table.
pub struct FunctionRegistry {
    functions: HashMap<&'static str, Arc<dyn Function>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// A registry with every built-in function registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        aggregate::register(&mut registry);
        string::register(&mut registry);
        utility::register(&mut registry);
        registry
    }

    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, function: Arc<dyn Function>) {
        for &alias in function.aliases() {
            if self.functions.insert(alias, function.clone()).is_some() {
                warn!(alias, "function alias registered twice, last registration wins");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<_> = self.functions.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }

    /// Apply the function registered as `input.name`, or forward to the
    /// engine when nothing is registered under that name.
    pub fn apply(&self, input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        match self.get(input.name) {
            Some(function) => {
                check_params(input.name, input.param, function.params())?;
                function.apply(input)
            }
            None => call_default(input),
        }
    }
}

/// Validate a function name for the engine fallback: non-empty,
/// alphanumeric/underscore, starting with a letter or underscore, max 64
/// chars. The name is rendered unquoted, so nothing else is allowed.
pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

fn call_default(input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
    if !is_valid_function_name(input.name) {
        return Err(ValidationError::InvalidFunctionName(input.name.to_string()));
    }
    debug!(function = input.name, args = input.args.len(), "forwarding to engine function");
    let operands = input.operands()?;
    let expr = input.caller.call_function(input.name, operands, input.param)?;
    Ok(input.finish(expr))
}

impl FunctionInput<'_> {
    pub fn arity(&self, expected: &'static str) -> ValidationError {
        ValidationError::Arity {
            name: self.name.to_string(),
            expected,
            found: self.args.len(),
        }
    }

    /// The only argument; anything else is an arity error.
    pub fn single(&self) -> Result<&Expression, ValidationError> {
        match self.args.as_slice() {
            [arg] => Ok(arg),
            _ => Err(self.arity("1")),
        }
    }

    /// All arguments as SQL operands.
    pub fn operands(&self) -> Result<Vec<SimpleExpr>, ValidationError> {
        self.args.iter().map(Expression::operand).collect()
    }

    /// Wrap the result, carrying the sources of every argument.
    pub fn finish(self, expr: SimpleExpr) -> Expression {
        let mut sources = Sources::default();
        for arg in &self.args {
            sources.merge(&arg.sources);
        }
        let names: Vec<&str> = self.args.iter().map(|a| a.name.as_str()).collect();
        Expression {
            name: format!("{}({})", self.name, names.join(", ")),
            term: Term::Value(expr),
            sources,
        }
    }
}
