//! Keycloak authentication and authorization layer for axum services.
//!
//! Resolves bearer and session tokens, refreshes them through the realm's
//! token endpoint, keeps the session in sync, and enforces role and
//! resource-scope requirements declared per route.

pub mod config;
pub mod errors;
pub mod guards;
pub mod http;
pub mod oauth;
pub mod request;
pub mod storage;
