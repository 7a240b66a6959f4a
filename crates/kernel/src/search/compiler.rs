//! Search compiler.
//!
//! A [`Search`] owns one validated request and turns it into engine
//! calls. Each clause is evaluated on first access and cached, and the
//! whole plan is evaluated before the engine sees anything, so a failing
//! clause never leaves a half-built query behind.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::SearchRegistry;
use super::engine::{Bounds, FunctionCaller, JoinPlan, QueryEngine, QueryHandle, SeaQueryEngine, Selection};
use super::error::ValidationError;
use super::evaluate::Evaluator;
use super::expr::{Expression, Ordering, Predicate, Sources, Term, column_expr};
use super::types::SearchRequest;
use crate::model::{Direction, ModelHandle, ModelRegistry};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 15;

/// Resolved `page` and `page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    /// Defaults fill in whichever of the two is missing; both missing
    /// means the query is not paginated.
    pub fn from_request(page: Option<u64>, page_size: Option<u64>) -> Option<Self> {
        if page.is_none() && page_size.is_none() {
            return None;
        }
        Some(Self {
            page: page.unwrap_or(DEFAULT_PAGE),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }

    /// `[(page - 1) * page_size, page * page_size)`.
    pub fn bounds(&self) -> Result<Bounds, ValidationError> {
        if self.page == 0 {
            return Err(ValidationError::InvalidPagination("page"));
        }
        if self.page_size == 0 {
            return Err(ValidationError::InvalidPagination("page_size"));
        }
        let out_of_range = || ValidationError::PageOutOfRange {
            page: self.page,
            page_size: self.page_size,
        };
        let start = (self.page - 1)
            .checked_mul(self.page_size)
            .ok_or_else(out_of_range)?;
        let stop = self
            .page
            .checked_mul(self.page_size)
            .ok_or_else(out_of_range)?;
        Ok(Bounds { start, stop })
    }
}

/// Everything the engine needs, fully evaluated.
struct Plan {
    from: Vec<ModelHandle>,
    selections: Vec<Selection>,
    joins: Vec<JoinPlan>,
    filter: Predicate,
    group_by: Vec<sea_query::SimpleExpr>,
    having: Predicate,
    order_by: Vec<Ordering>,
    bounds: Option<Bounds>,
}

/// One compilation of one request.
pub struct Search<'a> {
    request: SearchRequest,
    models: &'a dyn ModelRegistry,
    registry: &'a SearchRegistry,
    query: Option<Vec<Expression>>,
    joins: Option<Vec<(JoinPlan, Sources)>>,
    filter: Option<Predicate>,
    group_by: Option<Vec<Expression>>,
    having: Option<Predicate>,
    order_by: Option<Vec<Expression>>,
    handle: Option<QueryHandle>,
}

impl<'a> Search<'a> {
    pub fn new(
        request: SearchRequest,
        models: &'a dyn ModelRegistry,
        registry: &'a SearchRegistry,
    ) -> Self {
        Self {
            request,
            models,
            registry,
            query: None,
            joins: None,
            filter: None,
            group_by: None,
            having: None,
            order_by: None,
            handle: None,
        }
    }

    /// Validate raw JSON and wrap it.
    pub fn from_json(
        raw: &Value,
        models: &'a dyn ModelRegistry,
        registry: &'a SearchRegistry,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(SearchRequest::from_json(raw)?, models, registry))
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    fn evaluator<'e>(&'e self, caller: &'e dyn FunctionCaller) -> Evaluator<'e> {
        Evaluator {
            models: self.models,
            operators: &self.registry.operators,
            functions: &self.registry.functions,
            caller,
        }
    }

    /// Evaluated `query` items.
    pub fn query(&mut self, caller: &dyn FunctionCaller) -> Result<&[Expression], ValidationError> {
        let query = match self.query.take() {
            Some(query) => query,
            None => self.evaluator(caller).eval_fields(&self.request.query)?,
        };
        Ok(self.query.insert(query).as_slice())
    }

    /// Evaluated joins, each with the models its condition reads.
    pub fn joins(
        &mut self,
        caller: &dyn FunctionCaller,
    ) -> Result<&[(JoinPlan, Sources)], ValidationError> {
        let joins = match self.joins.take() {
            Some(joins) => joins,
            None => {
                let mut known = projection_sources(self.query(caller)?);
                let evaluator = self.evaluator(caller);
                let mut joins = Vec::with_capacity(self.request.join.len());
                for join in &self.request.join {
                    let (plan, sources) = evaluator.eval_join(join, &known)?;
                    known.merge(&sources);
                    joins.push((plan, sources));
                }
                joins
            }
        };
        Ok(self.joins.insert(joins).as_slice())
    }

    /// The `filter_by` predicate.
    pub fn filter(&mut self, caller: &dyn FunctionCaller) -> Result<&Predicate, ValidationError> {
        let filter = match self.filter.take() {
            Some(filter) => filter,
            None => self.evaluator(caller).eval_filter(&self.request.filter_by)?,
        };
        Ok(&*self.filter.insert(filter))
    }

    pub fn group_by(&mut self, caller: &dyn FunctionCaller) -> Result<&[Expression], ValidationError> {
        let group_by = match self.group_by.take() {
            Some(group_by) => group_by,
            None => self.evaluator(caller).eval_fields(&self.request.group_by)?,
        };
        Ok(self.group_by.insert(group_by).as_slice())
    }

    /// The post-aggregation predicate.
    pub fn having(&mut self, caller: &dyn FunctionCaller) -> Result<&Predicate, ValidationError> {
        let having = match self.having.take() {
            Some(having) => having,
            None => self.evaluator(caller).eval_filter(&self.request.having)?,
        };
        Ok(&*self.having.insert(having))
    }

    pub fn order_by(&mut self, caller: &dyn FunctionCaller) -> Result<&[Expression], ValidationError> {
        let order_by = match self.order_by.take() {
            Some(order_by) => order_by,
            None => self.evaluator(caller).eval_fields(&self.request.order_by)?,
        };
        Ok(self.order_by.insert(order_by).as_slice())
    }

    pub fn pagination(&self) -> Option<Pagination> {
        Pagination::from_request(self.request.page, self.request.page_size)
    }

    /// Slice bounds, or `None` for an unpaginated query.
    pub fn bounds(&self) -> Result<Option<Bounds>, ValidationError> {
        self.pagination().map(|p| p.bounds()).transpose()
    }

    /// Compile with the sea-query engine. The handle is cached.
    pub fn compile(&mut self) -> Result<&QueryHandle, ValidationError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => self.queryset(SeaQueryEngine::new())?,
        };
        Ok(&*self.handle.insert(handle))
    }

    /// Evaluate every clause, then drive `engine` through them in
    /// clause order.
    pub fn queryset<E: QueryEngine>(&mut self, mut engine: E) -> Result<E::Handle, ValidationError> {
        let plan = self.plan(&engine)?;
        debug!(
            from = plan.from.len(),
            selections = plan.selections.len(),
            joins = plan.joins.len(),
            group_by = plan.group_by.len(),
            order_by = plan.order_by.len(),
            "compiling search"
        );

        engine.project(&plan.from, plan.selections);
        for join in plan.joins {
            engine.join(join);
        }
        if let Some(filter) = plan.filter.into_expr() {
            engine.filter(filter);
        }
        if !plan.group_by.is_empty() {
            engine.group_by(plan.group_by);
        }
        if let Some(having) = plan.having.into_expr() {
            engine.having(having);
        }
        if !plan.order_by.is_empty() {
            engine.order_by(plan.order_by);
        }
        if let Some(bounds) = plan.bounds {
            debug!(start = bounds.start, stop = bounds.stop, "paginating search");
            engine.slice(bounds.start, bounds.stop);
        }
        Ok(engine.finish())
    }

    fn plan(&mut self, caller: &dyn FunctionCaller) -> Result<Plan, ValidationError> {
        let bounds = self.bounds()?;
        let selections = selections(self.query(caller)?)?;
        let projected = projection_sources(self.query(caller)?);
        let joins = self.joins(caller)?.to_vec();
        let filter = self.filter(caller)?.clone();
        let group_by = self.group_by(caller)?.to_vec();
        let having = self.having(caller)?.clone();
        let order_by = self.order_by(caller)?.to_vec();

        let joined: Vec<&ModelHandle> = joins.iter().map(|(plan, _)| &plan.model).collect();
        let mut from: Vec<ModelHandle> = projected
            .iter()
            .filter(|model| !joined.contains(model))
            .cloned()
            .collect();

        // Anything read by a later clause must be in FROM or joined.
        let mut referenced = Sources::default();
        for (_, sources) in &joins {
            referenced.merge(sources);
        }
        for predicate in [&filter, &having] {
            if let Some(sources) = predicate.sources() {
                referenced.merge(sources);
            }
        }
        for expression in group_by.iter().chain(&order_by) {
            referenced.merge(&expression.sources);
        }
        for model in referenced.iter() {
            if !from.contains(model) && !joined.contains(&model) {
                warn!(
                    model = model.name(),
                    "model is referenced but neither selected nor joined, adding it to FROM"
                );
                from.push(model.clone());
            }
        }

        Ok(Plan {
            from,
            selections,
            joins: joins.into_iter().map(|(plan, _)| plan).collect(),
            filter,
            group_by: group_by
                .iter()
                .map(Expression::operand)
                .collect::<Result<_, _>>()?,
            having,
            order_by: order_by
                .into_iter()
                .map(into_ordering)
                .collect::<Result<_, _>>()?,
            bounds,
        })
    }
}

/// Models read by the projection, in order.
fn projection_sources(query: &[Expression]) -> Sources {
    let mut sources = Sources::default();
    for expression in query {
        sources.merge(&expression.sources);
    }
    sources
}

/// The column a bare field reference selects, if `expression` is one.
fn plain_column(expression: &Expression) -> Option<&str> {
    let Term::Value(expr) = &expression.term else {
        return None;
    };
    let (model_name, field_name) = expression.name.split_once('.')?;
    let model = expression.sources.iter().find(|m| m.name() == model_name)?;
    let field = model.field(field_name)?;
    (*expr == column_expr(model, &field.column)).then_some(field.column.as_str())
}

/// Names an expression contributes to a result row.
fn output_names(expression: &Expression) -> Vec<&str> {
    match &expression.term {
        Term::Labeled { label, .. } => vec![label.as_str()],
        Term::Entity(model) => model
            .descriptor()
            .fields
            .iter()
            .map(|f| f.column.as_str())
            .collect(),
        _ => plain_column(expression).into_iter().collect(),
    }
}

/// The projection as engine selections.
///
/// Rows come back as JSON objects keyed by column name, so unlabelled
/// columns whose names clash are labelled `Model.field`, and a whole model
/// involved in a clash is expanded into such labelled columns.
fn selections(query: &[Expression]) -> Result<Vec<Selection>, ValidationError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for expression in query {
        for name in output_names(expression) {
            *seen.entry(name).or_default() += 1;
        }
    }
    let clashes = |name: &str| seen.get(name).is_some_and(|n| *n > 1);

    let mut selections = Vec::with_capacity(query.len());
    for expression in query {
        match &expression.term {
            Term::Labeled { expr, label } => selections.push(Selection {
                expr: expr.clone(),
                label: Some(label.clone()),
            }),
            Term::Entity(model) if output_names(expression).into_iter().any(clashes) => {
                for field in &model.descriptor().fields {
                    selections.push(Selection {
                        expr: column_expr(model, &field.column),
                        label: Some(format!("{}.{}", model.name(), field.name)),
                    });
                }
            }
            _ => selections.push(Selection {
                expr: expression.operand()?,
                label: plain_column(expression)
                    .filter(|column| clashes(*column))
                    .map(|_| expression.name.clone()),
            }),
        }
    }
    Ok(selections)
}

fn into_ordering(expression: Expression) -> Result<Ordering, ValidationError> {
    match expression.term {
        Term::Ordered(ordering) => Ok(ordering),
        _ => Ok(Ordering {
            expr: expression.operand()?,
            direction: Direction::Asc,
            nulls: None,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::operators::tests::shop;
    use crate::search::types::Params;
    use sea_query::SimpleExpr;
    use serde_json::json;
    use std::cell::Cell;

    fn compile(raw: Value) -> Result<QueryHandle, ValidationError> {
        let models = shop();
        let registry = SearchRegistry::new();
        let mut search = Search::from_json(&raw, &models, &registry)?;
        search.compile().cloned()
    }

    #[test]
    fn pagination_defaults() {
        assert_eq!(Pagination::from_request(None, None), None);
        let p = Pagination::from_request(None, Some(10)).unwrap();
        assert_eq!(p.bounds().unwrap(), Bounds { start: 0, stop: 10 });
        let p = Pagination::from_request(Some(2), Some(10)).unwrap();
        assert_eq!(p.bounds().unwrap(), Bounds { start: 10, stop: 20 });
        let p = Pagination::from_request(Some(3), None).unwrap();
        assert_eq!(p.bounds().unwrap(), Bounds { start: 30, stop: 45 });
    }

    #[test]
    fn pagination_overflow_is_an_error() {
        let p = Pagination::from_request(Some(u64::MAX), Some(2)).unwrap();
        assert!(matches!(p.bounds(), Err(ValidationError::PageOutOfRange { .. })));
        let p = Pagination {
            page: 0,
            page_size: 5,
        };
        assert_eq!(p.bounds(), Err(ValidationError::InvalidPagination("page")));
    }

    #[test]
    fn unpaginated_query() {
        let handle = compile(json!({"query": ["User.id", "User.name"]})).unwrap();
        assert_eq!(handle.bounds(), None);
        assert_eq!(
            handle.to_sql(),
            r#"SELECT "users"."id", "users"."name" FROM "users""#
        );
    }

    #[test]
    fn full_request() {
        let handle = compile(json!({
            "query": [
                "User.name",
                {"field": {"fn": "sum", "field": "Order.total"}, "op": "label", "value": "spent"},
            ],
            "join": {"model": "Order"},
            "filter_by": [
                {"field": "User.active", "op": "is", "value": true},
                "and",
                {"field": "Order.status", "op": "in", "value": ["paid", "sent"]},
            ],
            "group_by": ["User.name"],
            "having": {"field": {"fn": "sum", "field": "Order.total"}, "op": "gt", "value": 100},
            "order_by": ["-User.name"],
            "page": 2,
            "page_size": 10,
        }))
        .unwrap();
        assert_eq!(handle.bounds(), Some(Bounds { start: 10, stop: 20 }));
        assert_eq!(
            handle.to_sql(),
            concat!(
                r#"SELECT "users"."name", SUM("orders"."total") AS "spent" FROM "users" "#,
                r#"INNER JOIN "orders" ON "orders"."user_id" = "users"."id" "#,
                r#"WHERE "users"."active" IS TRUE AND "orders"."status" IN ('paid', 'sent') "#,
                r#"GROUP BY "users"."name" HAVING SUM("orders"."total") > 100 "#,
                r#"ORDER BY "users"."name" DESC LIMIT 10 OFFSET 10"#,
            )
        );
    }

    #[test]
    fn joined_models_leave_from() {
        let handle = compile(json!({
            "query": ["User.name", "Order.total"],
            "join": [{"model": "Order"}],
        }))
        .unwrap();
        let sql = handle.to_sql();
        assert!(sql.contains(r#"FROM "users" INNER JOIN "orders""#), "{sql}");
        assert!(!sql.contains(r#"FROM "users", "orders""#), "{sql}");
    }

    #[test]
    fn filter_only_models_are_added_to_from() {
        let handle = compile(json!({
            "query": "User.name",
            "filter_by": {"field": "Order.total", "op": "gt", "value": 1},
        }))
        .unwrap();
        assert!(
            handle
                .to_sql()
                .contains(r#"FROM "users" INNER JOIN "orders" ON TRUE"#)
        );
    }

    #[test]
    fn clashing_columns_are_labelled_by_model() {
        let handle = compile(json!({
            "query": ["User.id", "Order.id", "Order.total"],
            "join": {"model": "Order"},
        }))
        .unwrap();
        let sql = handle.to_sql();
        assert!(
            sql.starts_with(concat!(
                r#"SELECT "users"."id" AS "User.id", "orders"."id" AS "Order.id", "#,
                r#""orders"."total" FROM"#,
            )),
            "{sql}"
        );
    }

    #[test]
    fn clashing_models_are_expanded() {
        let handle = compile(json!({"query": ["User", "Order"], "join": {"model": "Order"}})).unwrap();
        assert!(
            handle.to_sql().starts_with(concat!(
                r#"SELECT "users"."id" AS "User.id", "users"."name" AS "User.name", "#,
                r#""users"."email" AS "User.email", "users"."active" AS "User.active", "#,
                r#""orders"."id" AS "Order.id", "orders"."user_id" AS "Order.user_id", "#,
                r#""orders"."total" AS "Order.total", "orders"."status" AS "Order.status", "#,
                r#""orders"."created_at" AS "Order.created_at" FROM"#,
            )),
            "{}",
            handle.to_sql()
        );

        let handle = compile(json!({"query": ["User", "Order.total"]})).unwrap();
        assert!(
            handle
                .to_sql()
                .starts_with(r#"SELECT "users".*, "orders"."total" FROM"#),
            "{}",
            handle.to_sql()
        );
    }

    #[test]
    fn relationship_predicates_stay_correlated() {
        let handle = compile(json!({
            "query": "User",
            "filter_by": {
                "field": "User.orders",
                "op": "any",
                "value": {"field": "Order.total", "op": "gt", "value": 100},
            },
        }))
        .unwrap();
        let sql = handle.to_sql();
        assert!(sql.starts_with(r#"SELECT "users".* FROM "users" WHERE EXISTS"#), "{sql}");
    }

    #[test]
    fn ordered_references_cannot_be_selected() {
        let err = compile(json!({"query": "-User.name"})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOperand { .. }));
    }

    #[test]
    fn order_by_accepts_functions_and_nulls() {
        let handle = compile(json!({
            "query": "Order",
            "order_by": [
                {"fn": "desc", "field": "Order.created_at", "param": {"nulls": "last"}},
                "Order.id",
            ],
        }))
        .unwrap();
        assert!(
            handle
                .to_sql()
                .ends_with(r#"ORDER BY "orders"."created_at" DESC NULLS LAST, "orders"."id" ASC"#)
        );
    }

    #[test]
    fn failures_surface_before_the_engine_runs() {
        let err = compile(json!({
            "query": "User",
            "filter_by": {"field": "User.name", "op": "between", "value": [1, 2, 3]},
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    /// Counts calls that reach the generic function fallback.
    struct CountingCaller {
        calls: Cell<usize>,
        inner: SeaQueryEngine,
    }

    impl FunctionCaller for CountingCaller {
        fn call_function(
            &self,
            name: &str,
            args: Vec<SimpleExpr>,
            param: &Params,
        ) -> Result<SimpleExpr, ValidationError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.call_function(name, args, param)
        }
    }

    #[test]
    fn clauses_are_evaluated_once() {
        let models = shop();
        let registry = SearchRegistry::new();
        let mut search = Search::from_json(
            &json!({
                "query": {"fn": "upper", "field": "User.name"},
                "filter_by": {"field": {"fn": "upper", "field": "User.name"}, "op": "eq", "value": "ANN"},
            }),
            &models,
            &registry,
        )
        .unwrap();
        let caller = CountingCaller {
            calls: Cell::new(0),
            inner: SeaQueryEngine::new(),
        };
        search.query(&caller).unwrap();
        search.query(&caller).unwrap();
        search.filter(&caller).unwrap();
        search.filter(&caller).unwrap();
        assert_eq!(caller.calls.get(), 2);

        // The plan reuses the cached clauses.
        let first = search.compile().unwrap().to_sql();
        let second = search.compile().unwrap().to_sql();
        assert_eq!(first, second);
        assert!(first.contains(r#"upper("users"."name") = 'ANN'"#), "{first}");
    }
}
