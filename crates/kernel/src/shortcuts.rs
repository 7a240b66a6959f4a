//! Get-or-create and update-or-create against declared models.
//!
//! Both shortcuts take a transaction-scoped advisory lock keyed on the
//! model and criteria before looking anything up. Two callers racing on
//! the same criteria therefore serialize even when no row exists yet, and
//! the second one finds the row the first inserted.

use anyhow::Context;
use sea_query::{
    Alias, Asterisk, Condition, ExprTrait, InsertStatement, PostgresQueryBuilder, Query,
    SelectStatement, UpdateStatement,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::model::{FieldHandle, ModelHandle, ModelRegistry};
use crate::search::expr::{column_expr, scalar_expr};
use crate::search::types::Scalar;

/// Field name to JSON scalar, as supplied by the caller.
pub type Fields = Map<String, Value>;

/// The row a shortcut settled on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub row: Value,
    pub created: bool,
}

/// Fields resolved to columns of one model.
#[derive(Debug, Clone, PartialEq)]
struct Assignments(Vec<(String, Scalar)>);

impl Assignments {
    fn resolve(
        models: &dyn ModelRegistry,
        model: &ModelHandle,
        fields: &Fields,
    ) -> AppResult<Self> {
        let mut resolved = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let column = match models.resolve_field(model, name)? {
                FieldHandle::Column { field, .. } => field.column,
                FieldHandle::Relationship { .. } => {
                    return Err(AppError::BadRequest(format!(
                        "'{}.{name}' is a relationship, not a column",
                        model.name()
                    )));
                }
            };
            resolved.push((column, to_scalar(name, value)?));
        }
        Ok(Self(resolved))
    }

    /// `self` with `other` written over it, column by column.
    fn overlaid(mut self, other: &Assignments) -> Self {
        for (column, value) in &other.0 {
            match self.0.iter_mut().find(|(c, _)| c == column) {
                Some(slot) => slot.1 = value.clone(),
                None => self.0.push((column.clone(), value.clone())),
            }
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn to_scalar(name: &str, value: &Value) -> AppResult<Scalar> {
    Scalar::from_json(value).map_err(|reason| AppError::BadRequest(format!("'{name}' {reason}")))
}

fn matching(model: &ModelHandle, criteria: &Assignments) -> Condition {
    criteria
        .0
        .iter()
        .fold(Condition::all(), |cond, (column, value)| {
            let lhs = column_expr(model, column);
            cond.add(match value {
                Scalar::Null => lhs.is_null(),
                other => lhs.eq(scalar_expr(other)),
            })
        })
}

fn select_statement(model: &ModelHandle, criteria: &Assignments) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Alias::new(model.table()))
        .cond_where(matching(model, criteria))
        .lock_exclusive()
        .to_owned()
}

fn insert_statement(model: &ModelHandle, values: &Assignments) -> AppResult<InsertStatement> {
    let mut insert = Query::insert();
    insert.into_table(Alias::new(model.table())).returning_all();
    if values.is_empty() {
        insert.or_default_values();
    } else {
        insert
            .columns(values.0.iter().map(|(column, _)| Alias::new(column)))
            .values(values.0.iter().map(|(_, value)| scalar_expr(value)))
            .context("failed to build insert")?;
    }
    Ok(insert)
}

fn update_statement(
    model: &ModelHandle,
    criteria: &Assignments,
    values: &Assignments,
) -> UpdateStatement {
    Query::update()
        .table(Alias::new(model.table()))
        .values(
            values
                .0
                .iter()
                .map(|(column, value)| (Alias::new(column), scalar_expr(value))),
        )
        .cond_where(matching(model, criteria))
        .returning_all()
        .to_owned()
}

/// Rows of `SELECT *`-shaped SQL as JSON objects.
fn as_json_rows(sql: &str) -> String {
    format!("WITH t AS ({sql}) SELECT row_to_json(t) FROM t")
}

async fn fetch_rows(tx: &mut Transaction<'_, Postgres>, sql: &str) -> AppResult<Vec<Value>> {
    debug!(sql = %sql, "shortcut statement");
    let rows: Vec<Value> = sqlx::query_scalar(&as_json_rows(sql))
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows)
}

/// Block until no other transaction holds the lock for `key`.
async fn lock_key(tx: &mut Transaction<'_, Postgres>, key: &str) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(&mut **tx)
        .await
        .context("failed to take advisory lock")?;
    Ok(())
}

/// What a shortcut does once the matching rows are known.
#[derive(Debug, PartialEq)]
enum Action {
    Keep(Value),
    Update,
    Create,
}

impl Action {
    fn settle(model: &ModelHandle, mut rows: Vec<Value>, update: bool) -> AppResult<Self> {
        if rows.len() > 1 {
            return Err(AppError::MultipleResults {
                model: model.name().to_string(),
                count: rows.len(),
            });
        }
        Ok(match rows.pop() {
            Some(row) if !update => Self::Keep(row),
            Some(_) => Self::Update,
            None => Self::Create,
        })
    }
}

async fn create(
    tx: &mut Transaction<'_, Postgres>,
    model: &ModelHandle,
    criteria: &Assignments,
    defaults: Assignments,
) -> AppResult<Value> {
    let values = defaults.overlaid(criteria);
    let sql = insert_statement(model, &values)?.to_string(PostgresQueryBuilder);
    fetch_rows(tx, &sql)
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("insert into '{}' returned no row", model.table()).into())
}

struct Prepared {
    model: ModelHandle,
    criteria: Assignments,
    defaults: Assignments,
}

fn prepare(
    models: &dyn ModelRegistry,
    model: &str,
    criteria: &Fields,
    defaults: &Fields,
) -> AppResult<Prepared> {
    let model = models.resolve_model(model)?;
    let criteria = Assignments::resolve(models, &model, criteria)?;
    let defaults = Assignments::resolve(models, &model, defaults)?;
    Ok(Prepared {
        model,
        criteria,
        defaults,
    })
}

async fn run(pool: &PgPool, prepared: Prepared, update: bool) -> AppResult<Outcome> {
    let Prepared {
        model,
        criteria,
        defaults,
    } = prepared;
    let select = select_statement(&model, &criteria).to_string(PostgresQueryBuilder);

    let mut tx = pool.begin().await.context("failed to start transaction")?;
    lock_key(&mut tx, &select).await?;
    let rows = fetch_rows(&mut tx, &select).await?;
    let outcome = match Action::settle(&model, rows, update)? {
        Action::Keep(row) => Outcome {
            row,
            created: false,
        },
        Action::Update => {
            let sql = update_statement(&model, &criteria, &defaults).to_string(PostgresQueryBuilder);
            let row = fetch_rows(&mut tx, &sql)
                .await?
                .pop()
                .ok_or(AppError::NotFound)?;
            Outcome {
                row,
                created: false,
            }
        }
        Action::Create => Outcome {
            row: create(&mut tx, &model, &criteria, defaults).await?,
            created: true,
        },
    };
    tx.commit().await.context("failed to commit transaction")?;

    debug!(model = %model.name(), created = outcome.created, update, "shortcut settled");
    Ok(outcome)
}

/// Return the single row matching `criteria`, inserting
/// `defaults ∪ criteria` when there is none.
pub async fn select_or_create(
    pool: &PgPool,
    models: &dyn ModelRegistry,
    model: &str,
    criteria: &Fields,
    defaults: &Fields,
) -> AppResult<Outcome> {
    let prepared = prepare(models, model, criteria, defaults)?;
    run(pool, prepared, false).await
}

/// Apply `defaults` to the single row matching `criteria`, inserting
/// `defaults ∪ criteria` when there is none.
pub async fn update_or_create(
    pool: &PgPool,
    models: &dyn ModelRegistry,
    model: &str,
    criteria: &Fields,
    defaults: &Fields,
) -> AppResult<Outcome> {
    let prepared = prepare(models, model, criteria, defaults)?;
    let update = !prepared.defaults.is_empty();
    run(pool, prepared, update).await
}
