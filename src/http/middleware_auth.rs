//! Guard middleware.
//!
//! Loads the `kauth.sid` session, builds the request handle, runs the auth and
//! resource guards for the matched route, exposes the handle to handlers, and
//! persists the session once the handler has run.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::prelude::*;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::{GuardError, KeycloakError, SessionError};
use crate::guards::HandlerRef;
use crate::http::context::AppState;
use crate::request::{AuthRequest, RequestContext, Session};
use crate::storage::SessionRecord;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "kauth.sid";

/// Request handle shared with handlers through request extensions
pub type SharedAuthRequest = Arc<Mutex<AuthRequest>>;

/// Create a JSON error response
fn error_response(status: StatusCode, error: &str) -> Response {
    (status, axum::Json(json!({ "error": error }))).into_response()
}

/// Value of the session cookie, if the request carries one
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Random URL-safe session id
pub(crate) fn new_session_id() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

async fn load_session(state: &AppState, headers: &HeaderMap) -> Result<Session, SessionError> {
    if let Some(session_id) = session_cookie(headers) {
        if let Some(record) = state.session_store.load(&session_id).await? {
            return Ok(Session::new(session_id, record, state.session_store.clone()));
        }
        tracing::debug!("unknown session cookie, starting a new session");
    }
    Ok(Session::new(
        new_session_id(),
        SessionRecord::default(),
        state.session_store.clone(),
    )
    .into_new())
}

/// Save or forget the session and set or clear its cookie on `response`
async fn finish_session(session: Option<Session>, response: &mut Response) -> Result<(), SessionError> {
    let Some(session) = session else {
        return Ok(());
    };
    let cookie = if session.is_destroyed() {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    } else if session.is_new() && session.record().is_empty() {
        return Ok(());
    } else {
        session.save().await?;
        if !session.is_new() {
            return Ok(());
        }
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, session.id())
    };
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(())
}

/// Run both guards; `Some(response)` short-circuits the request
async fn check_guards(
    state: &AppState,
    auth_request: &mut AuthRequest,
    handler: &HandlerRef,
) -> Result<Option<Response>, GuardError> {
    if !state
        .auth_guard()
        .can_activate(RequestContext::from(&mut *auth_request), handler)
        .await?
    {
        return Ok(Some(error_response(StatusCode::UNAUTHORIZED, "unauthorized")));
    }
    if !state
        .resource_guard()
        .can_activate(RequestContext::from(&mut *auth_request), handler)
        .await?
    {
        return Ok(Some(error_response(StatusCode::FORBIDDEN, "forbidden")));
    }
    Ok(None)
}

/// Axum middleware guarding every route it is layered on
pub async fn guard_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|path| state.metadata.handler_for(request.method(), path.as_str()))
        .unwrap_or_default();

    let session = match load_session(&state, request.headers()).await {
        Ok(session) => session,
        Err(err) => return GuardError(KeycloakError::from(err)).into_response(),
    };
    let mut auth_request = AuthRequest::new(request.headers().clone()).with_session(session);

    let mut response = match check_guards(&state, &mut auth_request, &handler).await {
        Ok(Some(rejection)) => rejection,
        Ok(None) => {
            let shared: SharedAuthRequest = Arc::new(Mutex::new(auth_request));
            request.extensions_mut().insert(shared.clone());
            let response = next.run(request).await;
            auth_request = std::mem::take(&mut *shared.lock().await);
            response
        }
        Err(err) => err.into_response(),
    };

    if let Err(err) = finish_session(auth_request.session, &mut response).await {
        return GuardError(KeycloakError::from(err)).into_response();
    }
    response
}
