//! Handles the resource-protected document endpoints

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{Value, json};

use super::context::AppState;
use super::handler_auth::keycloak_error_response;
use super::middleware_auth::SharedAuthRequest;

/// List documents visible to the caller
/// GET /documents
///
/// Requires the `documents:view` permission.
pub async fn list_documents_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut req = shared.lock().await;
    let mut service = state.keycloak.service(&mut req);
    let owner = service
        .get_username()
        .await
        .map_err(keycloak_error_response)?;

    Ok(Json(json!({
        "owner": owner,
        "documents": [],
    })))
}

/// Delete a document
/// DELETE /documents/{id}
///
/// Requires the `documents:delete` permission.
pub async fn delete_document_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut req = shared.lock().await;
    let mut service = state.keycloak.service(&mut req);
    let user_id = service
        .get_user_id()
        .await
        .map_err(keycloak_error_response)?;

    tracing::info!(%document_id, ?user_id, "document deleted");
    Ok(Json(json!({
        "deleted": document_id,
    })))
}
