//! Application state shared by the router, the guard middleware, and handlers.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::KeycloakOptions;
use crate::guards::{AuthGuard, ResourceGuard, RouteMetadata};
use crate::oauth::Keycloak;
use crate::storage::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub options: Arc<KeycloakOptions>,
    /// Identity provider handle used to build request-scoped services
    pub keycloak: Keycloak,
    /// Backend holding `kauth.sid` sessions
    pub session_store: Arc<dyn SessionStore>,
    /// Protection declared per route
    pub metadata: Arc<RouteMetadata>,
}

impl AppState {
    pub fn new(
        keycloak: Keycloak,
        session_store: Arc<dyn SessionStore>,
        metadata: RouteMetadata,
    ) -> Self {
        Self {
            options: keycloak.options.clone(),
            keycloak,
            session_store,
            metadata: Arc::new(metadata),
        }
    }

    pub fn auth_guard(&self) -> AuthGuard {
        AuthGuard::new(self.keycloak.clone(), self.metadata.clone())
    }

    pub fn resource_guard(&self) -> ResourceGuard {
        ResourceGuard::new(self.keycloak.clone(), self.metadata.clone())
    }
}

impl FromRef<AppState> for Keycloak {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.keycloak.clone()
    }
}
