//! Query engine seam.
//!
//! The compiler never builds SQL itself: it evaluates every clause into a
//! plan and hands the plan to a [`QueryEngine`] in a fixed order. The
//! engine methods are infallible; anything that can fail has already
//! failed during evaluation.

use sea_query::{
    Alias, Asterisk, Expr, Func, JoinType, NullOrdering, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr,
};
use serde::Serialize;

use super::error::ValidationError;
use super::expr::{Nulls, Ordering};
use super::functions::is_valid_function_name;
use super::params::{bool_param, check_params};
use super::types::{JoinKind, Params};
use crate::model::{Direction, ModelHandle};

/// Generic function call, used by the function registry's fallback.
pub trait FunctionCaller {
    fn call_function(
        &self,
        name: &str,
        args: Vec<SimpleExpr>,
        param: &Params,
    ) -> Result<SimpleExpr, ValidationError>;
}

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub expr: SimpleExpr,
    pub label: Option<String>,
}

/// One evaluated join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub model: ModelHandle,
    pub condition: SimpleExpr,
    pub kind: JoinKind,
}

/// Half-open row range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub start: u64,
    pub stop: u64,
}

impl Bounds {
    pub fn limit(&self) -> u64 {
        self.stop - self.start
    }
}

/// Relational query builder driven by the compiler.
///
/// Calls arrive in clause order: `project`, `join`, `filter`, `group_by`,
/// `having`, `order_by`, `slice`, then `finish`.
pub trait QueryEngine: FunctionCaller {
    type Handle;

    fn project(&mut self, from: &[ModelHandle], selections: Vec<Selection>);
    fn join(&mut self, join: JoinPlan);
    fn filter(&mut self, predicate: SimpleExpr);
    fn group_by(&mut self, exprs: Vec<SimpleExpr>);
    fn having(&mut self, predicate: SimpleExpr);
    fn order_by(&mut self, orderings: Vec<Ordering>);
    fn slice(&mut self, start: u64, stop: u64);
    fn finish(self) -> Self::Handle;
}

/// [`QueryEngine`] backed by a sea-query `SELECT` statement.
#[derive(Debug, Clone)]
pub struct SeaQueryEngine {
    statement: SelectStatement,
    bounds: Option<Bounds>,
}

impl Default for SeaQueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SeaQueryEngine {
    pub fn new() -> Self {
        Self {
            statement: Query::select(),
            bounds: None,
        }
    }
}

impl FunctionCaller for SeaQueryEngine {
    fn call_function(
        &self,
        name: &str,
        args: Vec<SimpleExpr>,
        param: &Params,
    ) -> Result<SimpleExpr, ValidationError> {
        if !is_valid_function_name(name) {
            return Err(ValidationError::InvalidFunctionName(name.to_string()));
        }
        check_params(name, param, &["distinct"])?;
        if bool_param(name, param, "distinct")? {
            let placeholders: Vec<String> = (1..=args.len()).map(|i| format!("${i}")).collect();
            return Ok(Expr::cust_with_exprs(
                format!("{name}(DISTINCT {})", placeholders.join(", ")),
                args,
            ));
        }
        Ok(Func::cust(Alias::new(name)).args(args).into())
    }
}

impl QueryEngine for SeaQueryEngine {
    type Handle = QueryHandle;

    fn project(&mut self, from: &[ModelHandle], selections: Vec<Selection>) {
        for selection in selections {
            match selection.label {
                Some(label) => self.statement.expr_as(selection.expr, Alias::new(label)),
                None => self.statement.expr(selection.expr),
            };
        }
        // Extra models are chained as `ON TRUE` joins ahead of the
        // relationship joins, so a join condition may read any of them.
        let mut from = from.iter();
        if let Some(root) = from.next() {
            self.statement.from(Alias::new(root.table()));
        }
        for model in from {
            self.statement.join(
                JoinType::InnerJoin,
                Alias::new(model.table()),
                SimpleExpr::from(Expr::val(true)),
            );
        }
    }

    fn join(&mut self, join: JoinPlan) {
        let join_type = match join.kind {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::LeftOuter => JoinType::LeftJoin,
            JoinKind::FullOuter => JoinType::FullOuterJoin,
        };
        self.statement
            .join(join_type, Alias::new(join.model.table()), join.condition);
    }

    fn filter(&mut self, predicate: SimpleExpr) {
        self.statement.and_where(predicate);
    }

    fn group_by(&mut self, exprs: Vec<SimpleExpr>) {
        self.statement.add_group_by(exprs);
    }

    fn having(&mut self, predicate: SimpleExpr) {
        self.statement.and_having(predicate);
    }

    fn order_by(&mut self, orderings: Vec<Ordering>) {
        for ordering in orderings {
            let order = match ordering.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            match ordering.nulls {
                Some(nulls) => {
                    let nulls = match nulls {
                        Nulls::First => NullOrdering::First,
                        Nulls::Last => NullOrdering::Last,
                    };
                    self.statement
                        .order_by_expr_with_nulls(ordering.expr, order, nulls)
                }
                None => self.statement.order_by_expr(ordering.expr, order),
            };
        }
    }

    fn slice(&mut self, start: u64, stop: u64) {
        self.bounds = Some(Bounds { start, stop });
    }

    fn finish(self) -> QueryHandle {
        QueryHandle {
            statement: self.statement,
            bounds: self.bounds,
        }
    }
}

/// A compiled query, ready to render or execute.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    /// The query without LIMIT/OFFSET.
    statement: SelectStatement,
    bounds: Option<Bounds>,
}

impl QueryHandle {
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn is_paginated(&self) -> bool {
        self.bounds.is_some()
    }

    /// The statement with the slice applied.
    pub fn statement(&self) -> SelectStatement {
        let mut statement = self.statement.clone();
        if let Some(bounds) = self.bounds {
            statement.limit(bounds.limit());
            statement.offset(bounds.start);
        }
        statement
    }

    /// `SELECT COUNT(*)` over the unsliced query.
    pub fn count_statement(&self) -> SelectStatement {
        let mut count = Query::select();
        count
            .expr(Func::count(Expr::col(Asterisk)))
            .from_subquery(self.statement.clone(), Alias::new("sift_count"));
        count
    }

    pub fn to_sql(&self) -> String {
        self.statement().to_string(PostgresQueryBuilder)
    }

    pub fn count_sql(&self) -> String {
        self.count_statement().to_string(PostgresQueryBuilder)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::expr::column_expr;
    use crate::search::operators::tests::shop;
    use crate::model::ModelRegistry;
    use sea_query::ExprTrait;
    use serde_json::json;

    #[test]
    fn fallback_call_renders_the_name_unquoted() {
        let engine = SeaQueryEngine::new();
        let expr = engine
            .call_function("date_trunc", vec![Expr::val("day").into()], &Params::new())
            .unwrap();
        let sql = Query::select().expr(expr).to_string(PostgresQueryBuilder);
        assert!(sql.contains("date_trunc('day')"), "{sql}");
    }

    #[test]
    fn fallback_call_supports_distinct() {
        let engine = SeaQueryEngine::new();
        let param = json!({"distinct": true}).as_object().cloned().unwrap();
        let expr = engine
            .call_function("array_agg", vec![Expr::val(1).into()], &param)
            .unwrap();
        let sql = Query::select().expr(expr).to_string(PostgresQueryBuilder);
        assert!(sql.contains("array_agg(DISTINCT 1)"), "{sql}");

        let param = json!({"over": "x"}).as_object().cloned().unwrap();
        assert!(engine.call_function("array_agg", vec![], &param).is_err());
    }

    #[test]
    fn clauses_land_in_the_statement() {
        let models = shop();
        let users = models.resolve_model("User").unwrap();
        let orders = models.resolve_model("Order").unwrap();

        let mut engine = SeaQueryEngine::new();
        engine.project(
            std::slice::from_ref(&users),
            vec![
                Selection {
                    expr: column_expr(&users, "name"),
                    label: None,
                },
                Selection {
                    expr: Func::sum(column_expr(&orders, "total")).into(),
                    label: Some("spent".to_string()),
                },
            ],
        );
        engine.join(JoinPlan {
            model: orders.clone(),
            condition: column_expr(&orders, "user_id").eq(column_expr(&users, "id")),
            kind: JoinKind::LeftOuter,
        });
        engine.filter(column_expr(&users, "active").eq(true));
        engine.group_by(vec![column_expr(&users, "name")]);
        engine.having(SimpleExpr::from(Func::sum(column_expr(&orders, "total"))).gt(10));
        engine.order_by(vec![Ordering {
            expr: column_expr(&users, "name"),
            direction: Direction::Desc,
            nulls: Some(Nulls::Last),
        }]);
        engine.slice(20, 30);
        let handle = engine.finish();

        let sql = handle.to_sql();
        assert!(sql.starts_with(r#"SELECT "users"."name", SUM("orders"."total") AS "spent""#), "{sql}");
        assert!(sql.contains(r#"FROM "users" LEFT JOIN "orders""#), "{sql}");
        assert!(sql.contains(r#"WHERE "users"."active" = TRUE"#), "{sql}");
        assert!(sql.contains(r#"GROUP BY "users"."name""#), "{sql}");
        assert!(sql.contains(r#"HAVING SUM("orders"."total") > 10"#), "{sql}");
        assert!(sql.contains(r#"ORDER BY "users"."name" DESC NULLS LAST"#), "{sql}");
        assert!(sql.ends_with("LIMIT 10 OFFSET 20"), "{sql}");

        let count = handle.count_sql();
        assert!(count.starts_with("SELECT COUNT(*) FROM (SELECT"), "{count}");
        assert!(!count.contains("LIMIT"), "{count}");
    }

    #[test]
    fn unsliced_handle_has_no_limit() {
        let models = shop();
        let users = models.resolve_model("User").unwrap();
        let mut engine = SeaQueryEngine::new();
        engine.project(
            std::slice::from_ref(&users),
            vec![Selection {
                expr: column_expr(&users, "id"),
                label: None,
            }],
        );
        let handle = engine.finish();
        assert!(!handle.is_paginated());
        assert_eq!(handle.to_sql(), r#"SELECT "users"."id" FROM "users""#);
    }
}
