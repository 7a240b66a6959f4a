//! Search execution on Postgres.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::SearchRegistry;
use super::compiler::{Pagination, Search};
use super::engine::{Bounds, QueryHandle};
use super::error::ValidationError;
use crate::error::AppResult;
use crate::model::SchemaRegistry;

/// Rows of one search, with paging details when the request was paginated.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Rows as JSON objects (`row_to_json`).
    pub items: Vec<Value>,

    /// Total matching rows, before slicing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_prev: Option<bool>,
}

impl SearchResult {
    /// An unpaginated result.
    pub fn all(items: Vec<Value>) -> Self {
        Self {
            items,
            total: None,
            page: None,
            page_size: None,
            total_pages: None,
            has_next: None,
            has_prev: None,
        }
    }

    /// A page of a larger result, with paging calculations.
    pub fn paged(items: Vec<Value>, total: u64, pagination: Pagination) -> Self {
        let Pagination { page, page_size } = pagination;
        let total_pages = total.div_ceil(page_size.max(1));
        Self {
            items,
            total: Some(total),
            page: Some(page),
            page_size: Some(page_size),
            total_pages: Some(total_pages),
            has_next: Some(page < total_pages),
            has_prev: Some(page > 1),
        }
    }
}

/// The SQL a request compiles to, without running it.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledSql {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl From<&QueryHandle> for CompiledSql {
    fn from(handle: &QueryHandle) -> Self {
        Self {
            sql: handle.to_sql(),
            count_sql: handle.is_paginated().then(|| handle.count_sql()),
            bounds: handle.bounds(),
        }
    }
}

/// Compiles search requests and runs them.
#[derive(Clone)]
pub struct SearchService {
    pool: PgPool,
    models: Arc<SchemaRegistry>,
    registry: Arc<SearchRegistry>,
    statement_timeout: Duration,
    max_page_size: u64,
}

impl SearchService {
    pub fn new(
        pool: PgPool,
        models: Arc<SchemaRegistry>,
        registry: Arc<SearchRegistry>,
        statement_timeout: Duration,
        max_page_size: u64,
    ) -> Self {
        Self {
            pool,
            models,
            registry,
            statement_timeout,
            max_page_size,
        }
    }

    pub fn models(&self) -> &SchemaRegistry {
        &self.models
    }

    /// Validate and compile a raw request.
    pub fn compile(&self, raw: &Value) -> AppResult<(QueryHandle, Option<Pagination>)> {
        let mut search = Search::from_json(raw, self.models.as_ref(), &self.registry)?;
        let pagination = search.pagination();
        let oversized = pagination
            .map(|p| p.page_size)
            .filter(|size| *size > self.max_page_size);
        if let Some(page_size) = oversized {
            return Err(ValidationError::PageSizeTooLarge {
                page_size,
                max: self.max_page_size,
            }
            .into());
        }
        let handle = search.compile()?.clone();
        Ok((handle, pagination))
    }

    /// Compile a raw request and return its SQL.
    pub fn compile_sql(&self, raw: &Value) -> AppResult<CompiledSql> {
        let (handle, _) = self.compile(raw)?;
        Ok(CompiledSql::from(&handle))
    }

    /// Compile and execute a raw request.
    ///
    /// Both the count and the row query run in one transaction under a
    /// statement timeout.
    pub async fn search(&self, raw: &Value) -> AppResult<SearchResult> {
        // The handle holds sea-query statements, which are not `Send`;
        // render it before the first await.
        let (main_sql, count_sql, pagination) = {
            let (handle, pagination) = self.compile(raw)?;
            (handle.to_sql(), handle.count_sql(), pagination)
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        debug!(sql = %main_sql, "executing search");
        let items: Vec<Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({main_sql}) t"))
                .fetch_all(&mut *tx)
                .await
                .context("failed to execute search query")?;

        let result = match pagination {
            Some(pagination) => {
                let total: i64 = sqlx::query_scalar(&count_sql)
                    .fetch_one(&mut *tx)
                    .await
                    .context("failed to execute count query")?;
                SearchResult::paged(items, u64::try_from(total).unwrap_or_default(), pagination)
            }
            None => SearchResult::all(items),
        };

        tx.commit()
            .await
            .context("failed to commit search transaction")?;

        debug!(
            returned = result.items.len(),
            total = ?result.total,
            "search completed"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("models", &self.models.len())
            .field("statement_timeout", &self.statement_timeout)
            .field("max_page_size", &self.max_page_size)
            .finish()
    }
}
