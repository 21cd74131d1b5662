//! Axum integration: guard middleware, session cookie handling, and the demo endpoints.

pub mod context;
mod handler_auth;
mod handler_documents;
mod handler_health;
pub mod middleware_auth;
pub mod server;

pub use context::AppState;
pub use middleware_auth::{SESSION_COOKIE, SharedAuthRequest, guard_middleware};
pub use server::{build_router, route_metadata};
