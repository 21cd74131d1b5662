//! Identity provider token and user-info endpoint client.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::KeycloakOptions;
use crate::errors::{GrantError, GrantErrorPayload};
use crate::oauth::token::Token;
use crate::oauth::types::{
    GrantRequest, GrantTokensOptions, TokenErrorData, TokenResponseData, TokenSet,
};

/// Raw user-info claims as returned by the identity provider
pub type UserInfoClaims = serde_json::Map<String, serde_json::Value>;

/// Trait for exchanging grants and fetching user info from the identity provider
#[async_trait]
pub trait GrantManager: Send + Sync {
    /// Exchange credentials at the token endpoint
    async fn exchange_grant(&self, options: GrantTokensOptions) -> Result<TokenSet, GrantError>;

    /// Fetch the user-info claims for an access token
    async fn user_info(&self, access_token: &Token) -> Result<UserInfoClaims, GrantError>;
}

/// [`GrantManager`] speaking OpenID Connect to a Keycloak realm over HTTP
#[derive(Clone)]
pub struct HttpGrantManager {
    http_client: reqwest::Client,
    options: Arc<KeycloakOptions>,
}

impl HttpGrantManager {
    pub fn new(http_client: reqwest::Client, options: Arc<KeycloakOptions>) -> Self {
        Self {
            http_client,
            options,
        }
    }

    /// Form body for a grant request, including client credentials
    fn form_params(&self, request: GrantRequest) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(6);
        if let Some(client_secret) = &self.options.client_secret {
            params.push(("client_secret", client_secret.clone()));
        }
        params.push(("client_id", self.options.client_id.clone()));
        params.push(("grant_type", request.grant_type().to_string()));
        match request {
            GrantRequest::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token));
            }
            GrantRequest::AuthorizationCode { code, redirect_uri } => {
                params.push(("code", code));
                params.push(("redirect_uri", redirect_uri));
            }
            GrantRequest::Password {
                username,
                password,
                scope,
            } => {
                params.push(("password", password));
                params.push(("scope", scope.join(" ")));
                params.push(("username", username));
            }
        }
        params
    }
}

/// Turn a non-2xx provider response into [`GrantError::Exchange`]
async fn exchange_error(response: reqwest::Response) -> GrantError {
    let status_code = response.status().as_u16();
    let data = response.json::<TokenErrorData>().await.unwrap_or_default();
    GrantError::Exchange {
        status_code,
        payload: GrantErrorPayload {
            error: data.error,
            message: data.error_description.unwrap_or_default(),
            status_code,
        },
    }
}

#[async_trait]
impl GrantManager for HttpGrantManager {
    async fn exchange_grant(&self, options: GrantTokensOptions) -> Result<TokenSet, GrantError> {
        let request = options
            .into_request()
            .ok_or(GrantError::MissingCredentials)?;
        let grant_type = request.grant_type();
        let params = self.form_params(request);

        tracing::debug!(grant_type, "exchanging grant");

        let response = self
            .http_client
            .post(self.options.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(exchange_error(response).await);
        }

        let data = response
            .json::<TokenResponseData>()
            .await
            .map_err(|e| GrantError::InvalidResponse(e.to_string()))?;

        Ok(TokenSet::from_response(data, &self.options.client_id))
    }

    async fn user_info(&self, access_token: &Token) -> Result<UserInfoClaims, GrantError> {
        let response = self
            .http_client
            .get(self.options.userinfo_endpoint())
            .bearer_auth(access_token.token())
            .send()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(exchange_error(response).await);
        }

        response
            .json::<UserInfoClaims>()
            .await
            .map_err(|e| GrantError::InvalidResponse(e.to_string()))
    }
}
