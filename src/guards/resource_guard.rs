//! Resource and scope permission gate.

use std::sync::Arc;

use crate::errors::Result;
use crate::guards::metadata::{HandlerRef, RouteMetadata};
use crate::oauth::Keycloak;
use crate::request::RequestContext;

/// Asks the policy decision point whether the caller holds every
/// `resource:scope` permission declared for a handler.
///
/// Protection is opt-in: handlers without a controller resource or without
/// scopes are always allowed.
#[derive(Clone)]
pub struct ResourceGuard {
    keycloak: Keycloak,
    metadata: Arc<RouteMetadata>,
}

impl ResourceGuard {
    pub fn new(keycloak: Keycloak, metadata: Arc<RouteMetadata>) -> Self {
        Self { keycloak, metadata }
    }

    pub async fn can_activate(&self, context: RequestContext<'_>, handler: &HandlerRef) -> Result<bool> {
        let Some(resource) = self.metadata.resource(handler) else {
            return Ok(true);
        };
        let scopes = self.metadata.scopes(handler);
        if scopes.is_empty() {
            return Ok(true);
        }
        let Some(req) = context.into_request() else {
            return Ok(false);
        };

        let mut service = self.keycloak.service(req);
        let Some(username) = service.get_username().await? else {
            return Ok(false);
        };
        tracing::debug!(
            "protecting resource '{}' with scopes [ {} ]",
            resource,
            scopes.join(", ")
        );

        let permissions: Vec<String> = scopes
            .iter()
            .map(|scope| format!("{resource}:{scope}"))
            .collect();
        if service.enforce(&permissions).await? {
            tracing::debug!("resource '{}' granted to '{}'", resource, username);
            return Ok(true);
        }
        tracing::debug!("resource '{}' denied to '{}'", resource, username);
        Ok(false)
    }
}
