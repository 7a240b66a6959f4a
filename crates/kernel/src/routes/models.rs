//! Model listing.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::model::ModelDescriptor;
use crate::state::AppState;

/// Declared models plus the registered operator and function aliases.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelDescriptor>,
    pub operators: Vec<&'static str>,
    pub functions: Vec<&'static str>,
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.models().describe(),
        operators: state.registry().operators.aliases(),
        functions: state.registry().functions.aliases(),
    })
}

/// Create the models router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/models", get(list_models))
}
