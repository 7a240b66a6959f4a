//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::model::SchemaRegistry;
use crate::search::{SearchRegistry, SearchService};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Declared models, loaded once at startup.
    models: Arc<SchemaRegistry>,

    /// Operator and function tables.
    registry: Arc<SearchRegistry>,

    search: SearchService,
}

impl AppState {
    /// Load the model declarations and connect to the database.
    pub async fn new(config: &Config) -> Result<Self> {
        let models = SchemaRegistry::load(&config.models_file).with_context(|| {
            format!(
                "failed to load model declarations from {}",
                config.models_file.display()
            )
        })?;
        info!(
            models = models.len(),
            file = %config.models_file.display(),
            "model declarations loaded"
        );

        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        Ok(Self::from_parts(
            db,
            Arc::new(models),
            Arc::new(SearchRegistry::new()),
            config.statement_timeout,
            config.max_page_size,
        ))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        db: PgPool,
        models: Arc<SchemaRegistry>,
        registry: Arc<SearchRegistry>,
        statement_timeout: Duration,
        max_page_size: u64,
    ) -> Self {
        let search = SearchService::new(
            db.clone(),
            models.clone(),
            registry.clone(),
            statement_timeout,
            max_page_size,
        );
        Self {
            inner: Arc::new(AppStateInner {
                db,
                models,
                registry,
                search,
            }),
        }
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn models(&self) -> &Arc<SchemaRegistry> {
        &self.inner.models
    }

    pub fn registry(&self) -> &Arc<SearchRegistry> {
        &self.inner.registry
    }

    pub fn search(&self) -> &SearchService {
        &self.inner.search
    }
}
