//! Handles GET /health

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::context::AppState;

/// Liveness check; public
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::config::version().ok(),
        "realm": state.options.realm,
    }))
}
