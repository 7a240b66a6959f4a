//! Sift
//!
//! Search HTTP server, plus offline compilation from the command line.

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sift_kernel::config::Config;
use sift_kernel::model::SchemaRegistry;
use sift_kernel::routes;
use sift_kernel::search::{CompiledSql, Search, SearchRegistry};
use sift_kernel::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model declaration file (overrides MODELS_FILE)
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Compile a search request and print the SQL
    Compile {
        /// Request file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
    },

    /// List the declared models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(models) = cli.models {
        config.models_file = models;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Compile { input } => compile(&config, &input),
        Command::Models => list_models(&config),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(port = config.port, "Starting sift");

    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;
    info!(models = state.models().len(), "Database connection established");

    let app = routes::router(state)
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn compile(config: &Config, input: &str) -> Result<()> {
    let models = load_models(config)?;
    let registry = SearchRegistry::new();

    let source = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };
    let raw: Value = serde_json::from_str(&source).context("request is not valid JSON")?;

    let mut search = Search::from_json(&raw, &models, &registry)?;
    let compiled = CompiledSql::from(search.compile()?);

    println!("{}", compiled.sql);
    if let Some(count_sql) = &compiled.count_sql {
        println!("-- count\n{count_sql}");
    }
    if let Some(bounds) = compiled.bounds {
        println!("-- rows [{}, {})", bounds.start, bounds.stop);
    }
    Ok(())
}

fn list_models(config: &Config) -> Result<()> {
    let models = load_models(config)?;
    let listing = serde_json::to_string_pretty(&models.describe())?;
    println!("{listing}");
    Ok(())
}

fn load_models(config: &Config) -> Result<SchemaRegistry> {
    SchemaRegistry::load(&config.models_file).with_context(|| {
        format!(
            "failed to load model declarations from {}",
            config.models_file.display()
        )
    })
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        // Credentials rule out a wildcard header list.
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
