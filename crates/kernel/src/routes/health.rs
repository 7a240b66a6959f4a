//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    postgres: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    postgres_latency_ms: Option<u64>,
    models: usize,
}

/// 200 while Postgres answers, 503 otherwise. The model count is
/// reported either way.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let latency = db::ping(state.db()).await;
    let code = if latency.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Health {
        status: if latency.is_some() { "healthy" } else { "unhealthy" },
        postgres: latency.is_some(),
        postgres_latency_ms: latency.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        models: state.models().len(),
    };
    (code, Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
