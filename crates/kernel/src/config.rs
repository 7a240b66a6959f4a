//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. Only `serve` needs it.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// YAML model declarations (default: ./models.yml).
    pub models_file: PathBuf,

    /// Per-search statement timeout (default: 10000 ms).
    pub statement_timeout: Duration,

    /// Largest `page_size` a search may request (default: 1000).
    pub max_page_size: u64,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let models_file = env::var("MODELS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./models.yml"));

        let statement_timeout_ms: u64 = env::var("STATEMENT_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("STATEMENT_TIMEOUT_MS must be a valid u64")?;

        let max_page_size = env::var("MAX_PAGE_SIZE")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("MAX_PAGE_SIZE must be a valid u64")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            models_file,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
            max_page_size,
            cors_allowed_origins,
        })
    }

    /// The database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            models_file: PathBuf::from("./models.yml"),
            statement_timeout: Duration::from_secs(10),
            max_page_size: 1000,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn database_url_is_only_required_on_demand() {
        let config = Config::default();
        let err = config.require_database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = Config {
            database_url: Some("postgres://localhost/sift".to_string()),
            ..Config::default()
        };
        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/sift");
    }
}
