//! Search route handlers.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::error::AppResult;
use crate::search::{CompiledSql, SearchResult};
use crate::state::AppState;

/// Create the search router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/search", post(execute_search))
        .route("/api/search/sql", post(compile_search))
}

/// Compile and run a search request.
async fn execute_search(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> AppResult<Json<SearchResult>> {
    let result = state.search().search(&request).await?;
    Ok(Json(result))
}

/// Compile a search request and return the SQL without running it.
async fn compile_search(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> AppResult<Json<CompiledSql>> {
    Ok(Json(state.search().compile_sql(&request)?))
}
