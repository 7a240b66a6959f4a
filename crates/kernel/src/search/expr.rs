//! Evaluated expressions and predicates.
//!
//! Operators and functions produce [`Expression`]s; filter trees reduce to
//! a [`Predicate`]. Both remember which models they reference so the
//! compiler can build the FROM list.

use sea_query::{Alias, Asterisk, Expr, Keyword, SimpleExpr};

use super::error::ValidationError;
use super::types::{Connector, Scalar};
use crate::model::{
    Direction, FieldDescriptor, ModelHandle, OrderHandle, RelationshipDescriptor,
};

/// Ordered set of models an expression reads from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sources(Vec<ModelHandle>);

impl Sources {
    pub fn one(model: ModelHandle) -> Self {
        Self(vec![model])
    }

    pub fn push(&mut self, model: ModelHandle) {
        if !self.0.contains(&model) {
            self.0.push(model);
        }
    }

    pub fn merge(&mut self, other: &Sources) {
        for model in &other.0 {
            self.push(model.clone());
        }
    }

    pub fn contains(&self, model: &ModelHandle) -> bool {
        self.0.contains(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelHandle> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `NULLS FIRST` / `NULLS LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

/// An expression with a sort direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: SimpleExpr,
    pub direction: Direction,
    pub nulls: Option<Nulls>,
}

/// What an evaluated field or node stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A whole model (`table.*`).
    Entity(ModelHandle),
    /// A relationship, usable only by `any`/`has` and joins.
    Relationship {
        model: ModelHandle,
        relationship: RelationshipDescriptor,
    },
    /// A scalar or boolean SQL expression.
    Value(SimpleExpr),
    /// An expression with a direction; valid in `order_by` only.
    Ordered(Ordering),
    /// An aliased expression; valid in `query`, transparent elsewhere.
    Labeled { expr: SimpleExpr, label: String },
}

/// An evaluated field, operator, or function.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub term: Term,
    pub sources: Sources,
    /// Human-readable origin, used in error messages.
    pub name: String,
}

impl Expression {
    pub fn entity(model: ModelHandle) -> Self {
        Self {
            name: model.name().to_string(),
            sources: Sources::one(model.clone()),
            term: Term::Entity(model),
        }
    }

    pub fn column(model: &ModelHandle, field: &FieldDescriptor) -> Self {
        Self {
            name: format!("{}.{}", model.name(), field.name),
            term: Term::Value(column_expr(model, &field.column)),
            sources: Sources::one(model.clone()),
        }
    }

    pub fn relationship(model: ModelHandle, relationship: RelationshipDescriptor) -> Self {
        Self {
            name: format!("{}.{}", model.name(), relationship.name),
            sources: Sources::one(model.clone()),
            term: Term::Relationship {
                model,
                relationship,
            },
        }
    }

    pub fn ordered(handle: OrderHandle) -> Self {
        Self {
            name: format!("{}.{}", handle.model.name(), handle.field.name),
            term: Term::Ordered(Ordering {
                expr: column_expr(&handle.model, &handle.field.column),
                direction: handle.direction,
                nulls: None,
            }),
            sources: Sources::one(handle.model),
        }
    }

    /// A literal text value (`type: plain`).
    pub fn literal(text: &str) -> Self {
        Self {
            name: format!("'{text}'"),
            term: Term::Value(Expr::val(text).into()),
            sources: Sources::default(),
        }
    }

    /// Same origin and sources, different term.
    pub fn with_term(self, term: Term) -> Self {
        Self { term, ..self }
    }

    /// The expression as a SQL operand.
    ///
    /// Labels are transparent; a whole model becomes `table.*`. Ordered
    /// expressions and relationships have no operand form.
    pub fn operand(&self) -> Result<SimpleExpr, ValidationError> {
        match &self.term {
            Term::Value(expr) | Term::Labeled { expr, .. } => Ok(expr.clone()),
            Term::Entity(model) => Ok(Expr::col((Alias::new(model.table()), Asterisk)).into()),
            Term::Ordered(_) => Err(ValidationError::InvalidOperand {
                field: self.name.clone(),
                reason: "an ordering cannot be used as a value".to_string(),
            }),
            Term::Relationship { .. } => Err(ValidationError::InvalidOperand {
                field: self.name.clone(),
                reason: "a relationship can only be used with 'any', 'has', or a join"
                    .to_string(),
            }),
        }
    }
}

/// `"table"."column"`.
pub fn column_expr(model: &ModelHandle, column: &str) -> SimpleExpr {
    Expr::col((Alias::new(model.table()), Alias::new(column))).into()
}

/// A JSON scalar as a SQL value.
pub fn scalar_expr(scalar: &Scalar) -> SimpleExpr {
    match scalar {
        Scalar::Null => SimpleExpr::Keyword(Keyword::Null),
        Scalar::Bool(b) => Expr::val(*b).into(),
        Scalar::Int(i) => Expr::val(*i).into(),
        Scalar::Float(f) => Expr::val(*f).into(),
        Scalar::Text(s) => Expr::val(s.as_str()).into(),
    }
}

/// An evaluated operator `value`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Scalar(Scalar),
    List(Vec<EvalValue>),
    Expr(Expression),
}

impl EvalValue {
    /// Models referenced by nested expressions.
    pub fn sources(&self) -> Sources {
        let mut sources = Sources::default();
        self.collect_sources(&mut sources);
        sources
    }

    fn collect_sources(&self, sources: &mut Sources) {
        match self {
            Self::Scalar(_) => {}
            Self::List(items) => items.iter().for_each(|i| i.collect_sources(sources)),
            Self::Expr(expr) => sources.merge(&expr.sources),
        }
    }
}

/// A reduced filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The neutral predicate: no constraint.
    Identity,
    Expr {
        expr: SimpleExpr,
        sources: Sources,
    },
}

impl Predicate {
    pub fn from_expression(expression: Expression) -> Result<Self, ValidationError> {
        Ok(Self::Expr {
            expr: expression.operand()?,
            sources: expression.sources,
        })
    }

    /// Combine any number of operands with a connector.
    ///
    /// Identity operands are skipped; one live operand is returned as is and
    /// none yields [`Predicate::Identity`].
    pub fn combine(connector: Connector, operands: impl IntoIterator<Item = Predicate>) -> Self {
        let mut combined: Option<(SimpleExpr, Sources)> = None;
        for operand in operands {
            let Predicate::Expr { expr, sources } = operand else {
                continue;
            };
            combined = Some(match combined {
                None => (expr, sources),
                Some((acc, mut acc_sources)) => {
                    acc_sources.merge(&sources);
                    let expr = match connector {
                        Connector::And => acc.and(expr),
                        Connector::Or => acc.or(expr),
                    };
                    (expr, acc_sources)
                }
            });
        }
        match combined {
            Some((expr, sources)) => Self::Expr { expr, sources },
            None => Self::Identity,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    pub fn sources(&self) -> Option<&Sources> {
        match self {
            Self::Identity => None,
            Self::Expr { sources, .. } => Some(sources),
        }
    }

    pub fn into_expr(self) -> Option<SimpleExpr> {
        match self {
            Self::Identity => None,
            Self::Expr { expr, .. } => Some(expr),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{ModelDescriptor, RelationshipKind};
    use sea_query::{ExprTrait, PostgresQueryBuilder, Query};

    fn model(name: &str, table: &str) -> ModelHandle {
        ModelHandle::new(ModelDescriptor {
            name: name.to_string(),
            table: table.to_string(),
            fields: vec![FieldDescriptor {
                name: "id".to_string(),
                column: "id".to_string(),
            }],
            relationships: Vec::new(),
        })
    }

    fn render(expr: SimpleExpr) -> String {
        Query::select()
            .expr(Expr::val(1))
            .and_where(expr)
            .to_string(PostgresQueryBuilder)
    }

    fn predicate(sql: &str) -> Predicate {
        Predicate::Expr {
            expr: Expr::cust(sql),
            sources: Sources::default(),
        }
    }

    #[test]
    fn combine_of_nothing_is_identity() {
        assert!(Predicate::combine(Connector::And, []).is_identity());
        assert!(Predicate::combine(Connector::Or, [Predicate::Identity]).is_identity());
    }

    #[test]
    fn combine_of_one_live_operand_is_that_operand() {
        let live = predicate("a = 1");
        for connector in [Connector::And, Connector::Or] {
            let combined = Predicate::combine(
                connector,
                [Predicate::Identity, live.clone(), Predicate::Identity],
            );
            assert_eq!(combined, live);
        }
    }

    #[test]
    fn combine_joins_live_operands() {
        let combined = Predicate::combine(Connector::Or, [predicate("a = 1"), predicate("b = 2")]);
        let sql = render(combined.into_expr().unwrap());
        assert!(sql.contains("(a = 1) OR (b = 2)"), "{sql}");
    }

    #[test]
    fn sources_are_deduplicated_in_order() {
        let users = model("User", "users");
        let orders = model("Order", "orders");
        let mut sources = Sources::one(users.clone());
        sources.merge(&Sources::one(orders.clone()));
        sources.push(users.clone());
        let names: Vec<&str> = sources.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["User", "Order"]);
    }

    #[test]
    fn entity_operand_is_table_star() {
        let sql = render(
            Expression::entity(model("User", "users"))
                .operand()
                .unwrap()
                .is_not_null(),
        );
        assert!(sql.contains(r#""users".*"#), "{sql}");
    }

    #[test]
    fn orderings_and_relationships_are_not_operands() {
        let users = model("User", "users");
        let ordered = Expression::ordered(OrderHandle {
            model: users.clone(),
            field: users.field("id").unwrap().clone(),
            direction: Direction::Desc,
        });
        assert!(ordered.operand().is_err());

        let relationship = Expression::relationship(
            users,
            RelationshipDescriptor {
                name: "orders".to_string(),
                target: "Order".to_string(),
                local: "id".to_string(),
                remote: "user_id".to_string(),
                kind: RelationshipKind::Many,
            },
        );
        assert!(relationship.operand().is_err());
    }
}
