//! Relationship predicates: `any` for collections, `has` for scalar
//! references. Both render as a correlated `EXISTS` subquery.

use std::sync::Arc;

use sea_query::{Alias, Expr, ExprTrait, Query};

use super::{Operator, OperatorInput, OperatorRegistry};
use crate::model::{FieldHandle, RelationshipKind};
use crate::search::error::ValidationError;
use crate::search::expr::{EvalValue, Expression, Term, column_expr, scalar_expr};
use crate::search::types::{Params, Scalar};

pub(super) fn register(registry: &mut OperatorRegistry) {
    registry.register(Arc::new(RelationshipPredicate {
        kind: RelationshipKind::Many,
        alias: "any",
    }));
    registry.register(Arc::new(RelationshipPredicate {
        kind: RelationshipKind::One,
        alias: "has",
    }));
}

/// `value` is an optional criterion node on the target model; every
/// `param` entry adds an equality criterion on a target column.
struct RelationshipPredicate {
    kind: RelationshipKind,
    alias: &'static str,
}

impl Operator for RelationshipPredicate {
    fn aliases(&self) -> &'static [&'static str] {
        match self.kind {
            RelationshipKind::Many => &["any"],
            RelationshipKind::One => &["has"],
        }
    }

    // Params name target columns; they are checked during apply.
    fn check_params(&self, _alias: &str, _param: &Params) -> Result<(), ValidationError> {
        Ok(())
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let Term::Relationship {
            model,
            relationship,
        } = &input.field.term
        else {
            return Err(ValidationError::InvalidOperand {
                field: input.field.name.clone(),
                reason: format!("'{}' requires a relationship", self.alias),
            });
        };
        if relationship.kind != self.kind {
            let (expected, other) = match self.kind {
                RelationshipKind::Many => ("a collection", "has"),
                RelationshipKind::One => ("a scalar", "any"),
            };
            return Err(ValidationError::InvalidOperand {
                field: input.field.name.clone(),
                reason: format!(
                    "'{}' requires {expected} relationship, use '{other}'",
                    self.alias
                ),
            });
        }

        let target = input.models.resolve_model(&relationship.target)?;
        let mut subquery = Query::select();
        subquery
            .expr(Expr::val(1))
            .from(Alias::new(target.table()))
            .and_where(
                Expr::col((Alias::new(target.table()), Alias::new(&relationship.remote)))
                    .equals((Alias::new(model.table()), Alias::new(&relationship.local))),
            );

        match &input.value {
            EvalValue::Scalar(Scalar::Null) => {}
            EvalValue::Expr(criterion) => {
                subquery.and_where(criterion.operand()?);
            }
            _ => return Err(input.invalid_value("must be a condition node or null")),
        }

        for (key, value) in input.param {
            let FieldHandle::Column { field, .. } = input.models.resolve_field(&target, key)?
            else {
                return Err(ValidationError::InvalidParam {
                    name: self.alias.to_string(),
                    param: key.clone(),
                    reason: "must name a column of the related model",
                });
            };
            let scalar =
                Scalar::from_json(value).map_err(|reason| ValidationError::InvalidParam {
                    name: self.alias.to_string(),
                    param: key.clone(),
                    reason,
                })?;
            let column = column_expr(&target, &field.column);
            subquery.and_where(match scalar {
                Scalar::Null => column.is_null(),
                scalar => column.eq(scalar_expr(&scalar)),
            });
        }

        // The target is scoped to the subquery; only outer models go to FROM.
        let mut sources = input.field.sources.clone();
        for source in input.value.sources().iter() {
            if *source != target {
                sources.push(source.clone());
            }
        }
        Ok(Expression {
            term: Term::Value(Expr::exists(subquery)),
            sources,
            name: input.field.name.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::tests::{apply, int, render_where, shop, text};
    use crate::search::error::ValidationError;
    use crate::search::expr::{EvalValue, Expression};
    use crate::search::types::Scalar;
    use serde_json::json;

    fn criterion(alias: &str, field: &str, value: EvalValue) -> EvalValue {
        let models = shop();
        let expr: Expression = apply(&models, alias, field, value, json!({})).unwrap();
        EvalValue::Expr(expr)
    }

    #[test]
    fn any_renders_a_correlated_exists() {
        let sql = render_where(
            "any",
            "User.orders",
            criterion("gt", "Order.total", int(100)),
            json!({}),
        )
        .unwrap();
        assert!(sql.contains("EXISTS(SELECT 1 FROM \"orders\""), "{sql}");
        assert!(sql.contains(r#""orders"."user_id" = "users"."id""#), "{sql}");
        assert!(sql.contains(r#""orders"."total" > 100"#), "{sql}");
    }

    #[test]
    fn has_takes_column_criteria_from_params() {
        let sql = render_where(
            "has",
            "Order.user",
            EvalValue::Scalar(Scalar::Null),
            json!({"name": "ann"}),
        )
        .unwrap();
        assert!(sql.contains(r#""users"."id" = "orders"."user_id""#), "{sql}");
        assert!(sql.contains(r#""users"."name" = 'ann'"#), "{sql}");
    }

    #[test]
    fn target_model_stays_out_of_from() {
        let models = shop();
        let expr = apply(
            &models,
            "any",
            "User.orders",
            criterion("eq", "Order.status", text("paid")),
            json!({}),
        )
        .unwrap();
        let names: Vec<&str> = expr.sources.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["User"]);
    }

    #[test]
    fn cardinality_must_match() {
        let err = render_where("has", "User.orders", EvalValue::Scalar(Scalar::Null), json!({}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperand { .. }));
        let err = render_where("any", "Order.user", EvalValue::Scalar(Scalar::Null), json!({}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperand { .. }));
    }

    #[test]
    fn field_must_be_a_relationship() {
        let err =
            render_where("any", "User.name", EvalValue::Scalar(Scalar::Null), json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperand { .. }));
    }

    #[test]
    fn params_must_name_target_columns() {
        let err = render_where(
            "any",
            "User.orders",
            EvalValue::Scalar(Scalar::Null),
            json!({"nope": 1}),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { .. }));
    }

    #[test]
    fn scalar_values_are_rejected() {
        let err = render_where("any", "User.orders", int(1), json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }
}
