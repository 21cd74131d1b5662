//! Coarse authentication and role gate.

use std::sync::Arc;

use crate::errors::Result;
use crate::guards::metadata::{HandlerRef, RouteMetadata};
use crate::oauth::Keycloak;
use crate::request::RequestContext;

/// Requires an authenticated caller unless the handler or its controller is public.
/// When roles are declared the caller must also satisfy one of them.
#[derive(Clone)]
pub struct AuthGuard {
    keycloak: Keycloak,
    metadata: Arc<RouteMetadata>,
}

impl AuthGuard {
    pub fn new(keycloak: Keycloak, metadata: Arc<RouteMetadata>) -> Self {
        Self { keycloak, metadata }
    }

    pub async fn can_activate(&self, context: RequestContext<'_>, handler: &HandlerRef) -> Result<bool> {
        if self.metadata.is_public(handler) {
            return Ok(true);
        }
        let Some(req) = context.into_request() else {
            return Ok(false);
        };

        let mut service = self.keycloak.service(req);
        let roles = self.metadata.roles(handler);
        let allowed = if roles.is_empty() {
            service.is_authenticated().await?
        } else {
            service.is_authorized_by_roles(&roles).await?
        };
        if !allowed {
            tracing::debug!(
                controller = handler.controller,
                handler = handler.handler,
                "authentication required"
            );
        }
        Ok(allowed)
    }
}
