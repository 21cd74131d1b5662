//! Policy decision point client.
//!
//! Permissions are checked with a UMA ticket grant in `decision` response mode:
//! the provider evaluates every `resource#scope` pair for the caller's access
//! token and answers with a single boolean.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::KeycloakOptions;
use crate::errors::PolicyError;
use crate::oauth::token::Token;
use crate::oauth::types::PolicyDecision;

pub const UMA_TICKET_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Trait for evaluating `resource:scope` permissions for an access token
#[async_trait]
pub trait PolicyEnforcer: Send + Sync {
    async fn enforce(
        &self,
        access_token: &Token,
        permissions: &[String],
    ) -> Result<PolicyDecision, PolicyError>;
}

/// Decision-mode response body
#[derive(Debug, Deserialize)]
struct DecisionResponse {
    #[serde(default)]
    result: bool,
}

/// [`PolicyEnforcer`] backed by the realm's authorization services
#[derive(Clone)]
pub struct UmaPolicyEnforcer {
    http_client: reqwest::Client,
    options: Arc<KeycloakOptions>,
}

impl UmaPolicyEnforcer {
    pub fn new(http_client: reqwest::Client, options: Arc<KeycloakOptions>) -> Self {
        Self {
            http_client,
            options,
        }
    }

    fn form_params(&self, permissions: &[String]) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("grant_type", UMA_TICKET_GRANT_TYPE.to_string()),
            ("audience", self.options.client_id.clone()),
            ("response_mode", "decision".to_string()),
        ];
        params.extend(
            permissions
                .iter()
                .map(|permission| ("permission", uma_permission(permission))),
        );
        params
    }
}

/// Convert `resource:scope` into the `resource#scope` form the provider expects
pub fn uma_permission(permission: &str) -> String {
    match permission.rsplit_once(':') {
        Some((resource, scope)) => format!("{resource}#{scope}"),
        None => permission.to_string(),
    }
}

#[async_trait]
impl PolicyEnforcer for UmaPolicyEnforcer {
    async fn enforce(
        &self,
        access_token: &Token,
        permissions: &[String],
    ) -> Result<PolicyDecision, PolicyError> {
        let response = self
            .http_client
            .post(self.options.token_endpoint())
            .bearer_auth(access_token.token())
            .form(&self.form_params(permissions))
            .send()
            .await
            .map_err(|e| PolicyError::Transport(e.to_string()))?;

        let status = response.status();
        if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
            tracing::debug!(status = status.as_u16(), "policy decision point denied permissions");
            return Ok(PolicyDecision::Denied);
        }
        if !status.is_success() {
            return Err(PolicyError::UnexpectedStatus(status.as_u16()));
        }

        let decision = response
            .json::<DecisionResponse>()
            .await
            .map_err(|e| PolicyError::InvalidResponse(e.to_string()))?;

        Ok(if decision.result {
            PolicyDecision::Granted
        } else {
            PolicyDecision::Denied
        })
    }
}
