//! Postgres pool.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::config::Config;

/// Connect the pool used for search execution.
///
/// Waiting for a connection is capped at the statement timeout, so a
/// saturated pool fails a search no later than a slow query would.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.statement_timeout)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to PostgreSQL")?;

    info!(
        max_connections = config.database_max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Round trip of a trivial query, or `None` if the database is unreachable.
pub async fn ping(pool: &PgPool) -> Option<Duration> {
    let started = Instant::now();
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => Some(started.elapsed()),
        Err(e) => {
            warn!(error = %e, "database ping failed");
            None
        }
    }
}
