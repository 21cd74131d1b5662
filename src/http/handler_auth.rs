//! Handles the session-backed login, callback, logout and userinfo endpoints

use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::context::AppState;
use super::middleware_auth::SharedAuthRequest;
use crate::errors::{GrantError, KeycloakError};
use crate::oauth::types::{
    AuthorizationCodeGrantOptions, PasswordGrantOptions, ScopeParam, TokenSet,
};

type HandlerResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Space separated scopes added to `openid`
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

fn invalid_request(description: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid_request",
            "error_description": description,
        })),
    )
}

/// Map a core failure onto an OAuth style error response.
///
/// Rejected credentials (any 4xx from the provider) surface as 401. Requests
/// missing credentials never reach the provider and surface as 400.
pub(crate) fn keycloak_error_response(err: KeycloakError) -> (StatusCode, Json<Value>) {
    match &err {
        KeycloakError::Grant(GrantError::MissingCredentials) => invalid_request(&err.to_string()),
        KeycloakError::Grant(grant) if grant.is_client_error() => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_grant",
                "error_description": grant.to_string(),
            })),
        ),
        KeycloakError::Session(_) => {
            tracing::error!(error = ?err, "session failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "server_error",
                    "error_description": err.to_string(),
                })),
            )
        }
        _ => {
            tracing::error!(error = ?err, "identity provider failure");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "server_error",
                    "error_description": err.to_string(),
                })),
            )
        }
    }
}

fn foreign_client_response() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "invalid_grant",
            "error_description": "Token was not issued to this client",
        })),
    )
}

fn token_set_json(tokens: &TokenSet) -> Value {
    json!({
        "message": tokens.message,
        "access_token": tokens.access_token.as_ref().map(|token| token.token()),
        "refresh_token": tokens.refresh_token.as_ref().map(|token| token.token()),
        "expires_in": tokens.expires_in,
        "refresh_expires_in": tokens.refresh_expires_in,
        "token_type": tokens.token_type,
        "scope": tokens.scope,
    })
}

/// Exchange credentials for tokens and store them in the session
/// POST /auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
    Json(login): Json<LoginRequest>,
) -> HandlerResult {
    if login.username.trim().is_empty() {
        return Err(invalid_request("Missing username"));
    }
    let mut req = shared.lock().await;
    let mut service = state.keycloak.service(&mut req);

    let options = PasswordGrantOptions {
        username: login.username,
        password: login.password,
        scope: login.scope.as_deref().map(ScopeParam::from),
    };
    match service.password_grant(options, true).await {
        Ok(Some(tokens)) => Ok(Json(token_set_json(&tokens))),
        Ok(None) => Err(foreign_client_response()),
        Err(err) => Err(keycloak_error_response(err)),
    }
}

/// Complete the authorization code flow
/// GET /auth/callback?code=...
pub async fn callback_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
    Query(query): Query<CallbackQuery>,
) -> HandlerResult {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "authorization callback returned an error");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": error })),
        ));
    }
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return Err(invalid_request("Missing code parameter"));
    };

    let mut req = shared.lock().await;
    let Some(base_url) = req.base_url() else {
        return Err(invalid_request("Unable to determine the request host"));
    };
    let mut service = state.keycloak.service(&mut req);

    let options = AuthorizationCodeGrantOptions {
        code,
        redirect_uri: format!("{base_url}/auth/callback"),
    };
    match service.authorization_code_grant(options, true).await {
        Ok(Some(tokens)) => Ok(Json(token_set_json(&tokens))),
        Ok(None) => Err(foreign_client_response()),
        Err(err) => Err(keycloak_error_response(err)),
    }
}

/// Forget the caller's identity and destroy the session
/// POST /auth/logout
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
) -> HandlerResult {
    let mut req = shared.lock().await;
    let mut service = state.keycloak.service(&mut req);
    service
        .logout()
        .await
        .map_err(keycloak_error_response)?;
    Ok(Json(json!({ "message": "logged out" })))
}

/// Claims about the authenticated caller
/// GET /auth/userinfo
pub async fn userinfo_handler(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedAuthRequest>,
) -> HandlerResult {
    let mut req = shared.lock().await;
    let mut service = state.keycloak.service(&mut req);

    let user_info = service
        .get_user_info(false)
        .await
        .map_err(keycloak_error_response)?;
    let roles = service.get_roles().await.map_err(keycloak_error_response)?;
    let scopes = service.get_scopes().await.map_err(keycloak_error_response)?;

    match user_info {
        Some(user_info) => Ok(Json(json!({
            "user": user_info,
            "roles": roles.unwrap_or_default(),
            "scopes": scopes.unwrap_or_default(),
        }))),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_token",
                "error_description": "No user information available for this token",
            })),
        )),
    }
}
