//! Aggregates: `count`, `sum`, `avg`, `min`, `max`.

use std::sync::Arc;

use sea_query::{Expr, Func, SimpleExpr};

use super::{Function, FunctionInput, FunctionRegistry};
use crate::search::error::ValidationError;
use crate::search::expr::Expression;
use crate::search::params::bool_param;

pub(super) fn register(registry: &mut FunctionRegistry) {
    for kind in [
        Aggregate::Count,
        Aggregate::Sum,
        Aggregate::Avg,
        Aggregate::Min,
        Aggregate::Max,
    ] {
        registry.register(Arc::new(kind));
    }
}

#[derive(Debug, Clone, Copy)]
enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn sql_name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl Function for Aggregate {
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Count => &["count"],
            Self::Sum => &["sum"],
            Self::Avg => &["avg"],
            Self::Min => &["min"],
            Self::Max => &["max"],
        }
    }

    fn params(&self) -> &'static [&'static str] {
        &["distinct"]
    }

    fn apply(&self, input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        let arg = input.single()?.operand()?;
        let expr: SimpleExpr = if bool_param(input.name, input.param, "distinct")? {
            Expr::cust_with_exprs(format!("{}(DISTINCT $1)", self.sql_name()), [arg])
        } else {
            match self {
                Self::Count => Func::count(arg),
                Self::Sum => Func::sum(arg),
                Self::Avg => Func::avg(arg),
                Self::Min => Func::min(arg),
                Self::Max => Func::max(arg),
            }
            .into()
        };
        Ok(input.finish(expr))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::tests::render;
    use crate::search::error::ValidationError;
    use serde_json::json;

    #[test]
    fn aggregates_render() {
        for (name, sql_name) in [
            ("count", "COUNT"),
            ("sum", "SUM"),
            ("avg", "AVG"),
            ("min", "MIN"),
            ("max", "MAX"),
        ] {
            let sql = render(name, &["Order.total"], json!({})).unwrap();
            assert!(
                sql.contains(&format!(r#"{sql_name}("orders"."total")"#)),
                "{sql}"
            );
        }
    }

    #[test]
    fn count_of_a_model_counts_rows() {
        let sql = render("count", &["Order"], json!({})).unwrap();
        assert!(sql.contains(r#"COUNT("orders".*)"#), "{sql}");
    }

    #[test]
    fn distinct_aggregates() {
        let sql = render("count", &["Order.user_id"], json!({"distinct": true})).unwrap();
        assert!(sql.contains(r#"COUNT(DISTINCT "orders"."user_id")"#), "{sql}");
    }

    #[test]
    fn aggregates_take_one_argument() {
        let err = render("sum", &["Order.total", "Order.id"], json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::Arity { found: 2, .. }));
    }
}
