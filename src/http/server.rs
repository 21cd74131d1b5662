//! Main router configuration and the route protection it declares.

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    context::AppState,
    handler_auth::{callback_handler, login_handler, logout_handler, userinfo_handler},
    handler_documents::{delete_document_handler, list_documents_handler},
    handler_health::health_handler,
    middleware_auth::guard_middleware,
};
use crate::guards::{HandlerRef, Metadata, RouteMetadata};

pub const HEALTH: HandlerRef = HandlerRef::new("health", "check");
pub const LOGIN: HandlerRef = HandlerRef::new("auth", "login");
pub const CALLBACK: HandlerRef = HandlerRef::new("auth", "callback");
pub const LOGOUT: HandlerRef = HandlerRef::new("auth", "logout");
pub const USERINFO: HandlerRef = HandlerRef::new("auth", "userinfo");
pub const LIST_DOCUMENTS: HandlerRef = HandlerRef::new("documents", "list");
pub const DELETE_DOCUMENT: HandlerRef = HandlerRef::new("documents", "delete");

/// Protection declared for the routes served by [`build_router`]
pub fn route_metadata() -> RouteMetadata {
    RouteMetadata::new()
        .with_controller("health", Metadata::new().public())
        .with_controller("documents", Metadata::new().resource("documents"))
        .with_handler(LOGIN, Metadata::new().public())
        .with_handler(CALLBACK, Metadata::new().public())
        .with_handler(LOGOUT, Metadata::new().public())
        .with_handler(LIST_DOCUMENTS, Metadata::new().scopes(&["view"]))
        .with_handler(DELETE_DOCUMENT, Metadata::new().scopes(&["delete"]))
        .with_route(Method::GET, "/health", HEALTH)
        .with_route(Method::POST, "/auth/login", LOGIN)
        .with_route(Method::GET, "/auth/callback", CALLBACK)
        .with_route(Method::POST, "/auth/logout", LOGOUT)
        .with_route(Method::GET, "/auth/userinfo", USERINFO)
        .with_route(Method::GET, "/documents", LIST_DOCUMENTS)
        .with_route(Method::DELETE, "/documents/{id}", DELETE_DOCUMENT)
}

/// Build the application router.
///
/// Every route runs behind the guard middleware; routes missing from the
/// metadata registry require an authenticated caller.
pub fn build_router(ctx: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(login_handler))
        .route("/callback", get(callback_handler))
        .route("/logout", post(logout_handler))
        .route("/userinfo", get(userinfo_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/documents", get(list_documents_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .nest("/auth", auth_routes)
        .route_layer(middleware::from_fn_with_state(ctx.clone(), guard_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
