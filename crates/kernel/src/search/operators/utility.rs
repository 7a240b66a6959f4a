//! Non-filtering operators that transform a field: ordering, DISTINCT,
//! aliasing, pass-through, and `regexp_replace`.

use std::sync::Arc;

use sea_query::{Alias, Expr, Func, SimpleExpr};

use super::{Operator, OperatorInput, OperatorRegistry};
use crate::model::Direction;
use crate::search::error::ValidationError;
use crate::search::expr::{EvalValue, Expression, Ordering, Term};
use crate::search::params::{nulls_param, str_param};
use crate::search::types::Scalar;

pub(super) fn register(registry: &mut OperatorRegistry) {
    registry.register(Arc::new(Ordered {
        direction: Direction::Asc,
    }));
    registry.register(Arc::new(Ordered {
        direction: Direction::Desc,
    }));
    registry.register(Arc::new(Distinct));
    registry.register(Arc::new(Label));
    registry.register(Arc::new(PassThrough));
    registry.register(Arc::new(RegexpReplace));
}

/// The expression under an ordering, or the field's operand.
fn base_expr(field: &Expression) -> Result<SimpleExpr, ValidationError> {
    match &field.term {
        Term::Ordered(ordering) => Ok(ordering.expr.clone()),
        _ => field.operand(),
    }
}

struct Ordered {
    direction: Direction,
}

impl Operator for Ordered {
    fn aliases(&self) -> &'static [&'static str] {
        match self.direction {
            Direction::Asc => &["asc"],
            Direction::Desc => &["desc"],
        }
    }

    fn params(&self) -> &'static [&'static str] {
        &["nulls"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let ordering = Ordering {
            expr: base_expr(&input.field)?,
            direction: self.direction,
            nulls: nulls_param(input.alias, input.param)?,
        };
        Ok(input.field.with_term(Term::Ordered(ordering)))
    }
}

struct Distinct;

impl Operator for Distinct {
    fn aliases(&self) -> &'static [&'static str] {
        &["distinct"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let expr = Expr::cust_with_exprs("DISTINCT $1", [input.lhs()?]);
        Ok(input.field.with_term(Term::Value(expr)))
    }
}

/// `AS label`; the value is the label.
struct Label;

impl Operator for Label {
    fn aliases(&self) -> &'static [&'static str] {
        &["label"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let label = input.text()?.to_string();
        if label.is_empty() {
            return Err(input.invalid_value("must be a non-empty label"));
        }
        let expr = input.lhs()?;
        Ok(input.field.with_term(Term::Labeled { expr, label }))
    }
}

/// Returns the field unchanged.
struct PassThrough;

impl Operator for PassThrough {
    fn aliases(&self) -> &'static [&'static str] {
        &["field", "me", "self", "plain"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        Ok(input.field)
    }
}

/// `regexp_replace(field, pattern, replacement[, flags])`.
struct RegexpReplace;

impl Operator for RegexpReplace {
    fn aliases(&self) -> &'static [&'static str] {
        &["regexp_replace"]
    }

    fn params(&self) -> &'static [&'static str] {
        &["flags"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let items = input.list()?;
        let [EvalValue::Scalar(Scalar::Text(pattern)), EvalValue::Scalar(Scalar::Text(replacement))] =
            items
        else {
            return Err(input.invalid_value("must be a [pattern, replacement] pair of strings"));
        };

        let mut args: Vec<SimpleExpr> = vec![
            input.lhs()?,
            Expr::val(pattern.as_str()).into(),
            Expr::val(replacement.as_str()).into(),
        ];
        if let Some(flags) = str_param(input.alias, input.param, "flags")? {
            args.push(Expr::val(flags).into());
        }
        let expr: SimpleExpr = Func::cust(Alias::new("REGEXP_REPLACE")).args(args).into();
        Ok(input.field.with_term(Term::Value(expr)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::tests::{apply, int, render_where, shop, text};
    use crate::model::Direction;
    use crate::search::error::ValidationError;
    use crate::search::expr::{EvalValue, Nulls, Term};
    use serde_json::json;

    #[test]
    fn desc_produces_an_ordering() {
        let models = shop();
        let expr = apply(&models, "desc", "Order.total", int(0), json!({"nulls": "last"})).unwrap();
        let Term::Ordered(ordering) = expr.term else {
            panic!("expected an ordering");
        };
        assert_eq!(ordering.direction, Direction::Desc);
        assert_eq!(ordering.nulls, Some(Nulls::Last));
    }

    #[test]
    fn asc_overrides_a_marker_direction() {
        let models = shop();
        let expr = apply(&models, "asc", "-Order.total", int(0), json!({})).unwrap();
        let Term::Ordered(ordering) = expr.term else {
            panic!("expected an ordering");
        };
        assert_eq!(ordering.direction, Direction::Asc);
    }

    #[test]
    fn label_requires_a_string() {
        let models = shop();
        let expr = apply(&models, "label", "User.name", text("username"), json!({})).unwrap();
        assert!(matches!(expr.term, Term::Labeled { ref label, .. } if label == "username"));

        let err = apply(&models, "label", "User.name", int(1), json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        let err = apply(&models, "label", "User.name", text(""), json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn pass_through_keeps_the_field() {
        let models = shop();
        for alias in ["field", "me", "self", "plain"] {
            let expr = apply(&models, alias, "User", int(0), json!({})).unwrap();
            assert!(matches!(expr.term, Term::Entity(_)), "{alias}");
        }
    }

    #[test]
    fn distinct_wraps_the_field() {
        let sql = render_where("distinct", "User.name", int(0), json!({})).unwrap();
        assert!(sql.contains(r#"DISTINCT "users"."name""#), "{sql}");
    }

    #[test]
    fn regexp_replace_takes_a_pair() {
        let sql = render_where(
            "regexp_replace",
            "User.name",
            EvalValue::List(vec![text("a+"), text("b")]),
            json!({"flags": "g"}),
        )
        .unwrap();
        assert!(
            sql.contains(r#"REGEXP_REPLACE("users"."name", 'a+', 'b', 'g')"#),
            "{sql}"
        );

        let err = render_where(
            "regexp_replace",
            "User.name",
            EvalValue::List(vec![text("a+")]),
            json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }
}
