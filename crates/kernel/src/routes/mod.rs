//! HTTP route handlers.

pub mod health;
pub mod models;
pub mod search;

use axum::Router;

use crate::state::AppState;

/// All routes, with state attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(models::router())
        .merge(search::router())
        .with_state(state)
}
