//! Keycloak token and grant lifecycle: token model, resolver, grant manager,
//! policy decision point client, session synchronizer, and the request-scoped
//! authentication service.

pub mod grant_manager;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod session_sync;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use crate::config::KeycloakOptions;
use crate::request::AuthRequest;

pub use grant_manager::{GrantManager, HttpGrantManager, UserInfoClaims};
pub use policy::{PolicyEnforcer, UmaPolicyEnforcer};
pub use resolver::TokenResolver;
pub use service::{AuthState, KeycloakService};
pub use session_sync::SessionSynchronizer;
pub use token::{Token, TokenClaims};
pub use types::{
    AuthorizationCodeGrantOptions, Grant, GrantTokensOptions, PasswordGrantOptions,
    PolicyDecision, RefreshTokenGrantOptions, RoleRequirement, ScopeParam, TokenSet, UserInfo,
};

/// Process-wide identity provider handle shared by every request
#[derive(Clone)]
pub struct Keycloak {
    pub options: Arc<KeycloakOptions>,
    pub grant_manager: Arc<dyn GrantManager>,
    pub policy_enforcer: Arc<dyn PolicyEnforcer>,
}

impl Keycloak {
    /// Provider talking to the realm over HTTP with `http_client`
    pub fn new(options: Arc<KeycloakOptions>, http_client: reqwest::Client) -> Self {
        Self {
            grant_manager: Arc::new(HttpGrantManager::new(http_client.clone(), options.clone())),
            policy_enforcer: Arc::new(UmaPolicyEnforcer::new(http_client, options.clone())),
            options,
        }
    }

    pub fn with_components(
        options: Arc<KeycloakOptions>,
        grant_manager: Arc<dyn GrantManager>,
        policy_enforcer: Arc<dyn PolicyEnforcer>,
    ) -> Self {
        Self {
            options,
            grant_manager,
            policy_enforcer,
        }
    }

    /// Authentication service scoped to one request
    pub fn service<'r>(&self, req: &'r mut AuthRequest) -> KeycloakService<'r> {
        KeycloakService::new(self, req)
    }
}
