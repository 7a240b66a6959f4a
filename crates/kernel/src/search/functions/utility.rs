//! Function forms of the utility operators: `asc`, `desc`, `distinct`,
//! and the pass-through aliases.

use std::sync::Arc;

use sea_query::Expr;

use super::{Function, FunctionInput, FunctionRegistry};
use crate::model::Direction;
use crate::search::error::ValidationError;
use crate::search::expr::{Expression, Ordering, Term};
use crate::search::params::nulls_param;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(Ordered {
        direction: Direction::Asc,
    }));
    registry.register(Arc::new(Ordered {
        direction: Direction::Desc,
    }));
    registry.register(Arc::new(Distinct));
    registry.register(Arc::new(PassThrough));
}

struct Ordered {
    direction: Direction,
}

impl Function for Ordered {
    fn aliases(&self) -> &'static [&'static str] {
        match self.direction {
            Direction::Asc => &["asc"],
            Direction::Desc => &["desc"],
        }
    }

    fn params(&self) -> &'static [&'static str] {
        &["nulls"]
    }

    fn apply(&self, mut input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        input.single()?;
        let nulls = nulls_param(input.name, input.param)?;
        let Some(arg) = input.args.pop() else {
            return Err(input.arity("1"));
        };
        let expr = match &arg.term {
            Term::Ordered(ordering) => ordering.expr.clone(),
            _ => arg.operand()?,
        };
        Ok(arg.with_term(Term::Ordered(Ordering {
            expr,
            direction: self.direction,
            nulls,
        })))
    }
}

struct Distinct;

impl Function for Distinct {
    fn aliases(&self) -> &'static [&'static str] {
        &["distinct"]
    }

    fn apply(&self, input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        let expr = Expr::cust_with_exprs("DISTINCT $1", [input.single()?.operand()?]);
        Ok(input.finish(expr))
    }
}

struct PassThrough;

impl Function for PassThrough {
    fn aliases(&self) -> &'static [&'static str] {
        &["field", "me", "self", "plain"]
    }

    fn apply(&self, mut input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        input.single()?;
        input.args.pop().ok_or_else(|| input.arity("1"))
    }
}
