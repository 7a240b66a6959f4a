//! Comparison, range, membership, and null-test operators.

use std::sync::Arc;

use sea_query::{Expr, ExprTrait};

use super::{Operator, OperatorInput, OperatorRegistry};
use crate::search::error::ValidationError;
use crate::search::expr::{EvalValue, Expression};
use crate::search::params::bool_param;
use crate::search::types::Scalar;

pub(super) fn register(registry: &mut OperatorRegistry) {
    let comparisons: [(Cmp, &'static [&'static str]); 6] = [
        (Cmp::Eq, &["=", "==", "eq", "equal", "equals"]),
        (
            Cmp::Ne,
            &["!=", "<>", "ne", "notequal", "not_equal", "notequals", "not_equals"],
        ),
        (Cmp::Lt, &["<", "lt", "less_than"]),
        (
            Cmp::Le,
            &["<=", "le", "lte", "less_than_equal", "less_than_equals"],
        ),
        (Cmp::Gt, &[">", "gt", "greater_than"]),
        (
            Cmp::Ge,
            &[">=", "ge", "gte", "greater_than_equal", "greater_than_equals"],
        ),
    ];
    for (cmp, aliases) in comparisons {
        registry.register(Arc::new(Comparison { cmp, aliases }));
    }

    registry.register(Arc::new(Between));
    registry.register(Arc::new(Membership {
        negated: false,
        aliases: &["in"],
    }));
    registry.register(Arc::new(Membership {
        negated: true,
        aliases: &["notin", "not_in"],
    }));
    registry.register(Arc::new(Is {
        negated: false,
        aliases: &["is"],
    }));
    registry.register(Arc::new(Is {
        negated: true,
        aliases: &["isnot", "is_not"],
    }));
    registry.register(Arc::new(NullTest {
        negated: false,
        aliases: &["isnull", "is_null"],
    }));
    registry.register(Arc::new(NullTest {
        negated: true,
        aliases: &["isnotnull", "is_not_null"],
    }));
}

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Comparison {
    cmp: Cmp,
    aliases: &'static [&'static str],
}

impl Operator for Comparison {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let lhs = input.lhs()?;
        let expr = match (&input.value, self.cmp) {
            // `= NULL` is never true; compare with IS instead.
            (EvalValue::Scalar(Scalar::Null), Cmp::Eq) => lhs.is_null(),
            (EvalValue::Scalar(Scalar::Null), Cmp::Ne) => lhs.is_not_null(),
            (_, cmp) => {
                let rhs = input.single()?;
                match cmp {
                    Cmp::Eq => lhs.eq(rhs),
                    Cmp::Ne => lhs.ne(rhs),
                    Cmp::Lt => lhs.lt(rhs),
                    Cmp::Le => lhs.lte(rhs),
                    Cmp::Gt => lhs.gt(rhs),
                    Cmp::Ge => lhs.gte(rhs),
                }
            }
        };
        Ok(input.finish(expr))
    }
}

struct Between;

impl Operator for Between {
    fn aliases(&self) -> &'static [&'static str] {
        &["between"]
    }

    fn params(&self) -> &'static [&'static str] {
        &["symmetric"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let bounds = input.list()?;
        let [low, high] = bounds else {
            return Err(input.invalid_value(format!(
                "must be a list of exactly 2 bounds, got {}",
                bounds.len()
            )));
        };
        let (low, high) = (input.item(low)?, input.item(high)?);
        let lhs = input.lhs()?;

        let expr = if bool_param(input.alias, input.param, "symmetric")? {
            Expr::cust_with_exprs("$1 BETWEEN SYMMETRIC $2 AND $3", [lhs, low, high])
        } else {
            lhs.between(low, high)
        };
        Ok(input.finish(expr))
    }
}

struct Membership {
    negated: bool,
    aliases: &'static [&'static str],
}

impl Operator for Membership {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let items = input
            .list()?
            .iter()
            .map(|item| input.item(item))
            .collect::<Result<Vec<_>, _>>()?;
        let lhs = input.lhs()?;
        let expr = if self.negated {
            lhs.is_not_in(items)
        } else {
            lhs.is_in(items)
        };
        Ok(input.finish(expr))
    }
}

struct Is {
    negated: bool,
    aliases: &'static [&'static str],
}

impl Operator for Is {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let lhs = input.lhs()?;
        let rhs = input.single()?;
        let expr = if self.negated { lhs.is_not(rhs) } else { lhs.is(rhs) };
        Ok(input.finish(expr))
    }
}

/// `IS NULL` / `IS NOT NULL`; the value is ignored.
struct NullTest {
    negated: bool,
    aliases: &'static [&'static str],
}

impl Operator for NullTest {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let lhs = input.lhs()?;
        let expr = if self.negated {
            lhs.is_not_null()
        } else {
            lhs.is_null()
        };
        Ok(input.finish(expr))
    }
}
