//! In-crate test doubles for the identity provider seams.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{GrantError, GrantErrorPayload, PolicyError};
use crate::oauth::grant_manager::{GrantManager, UserInfoClaims};
use crate::oauth::policy::PolicyEnforcer;
use crate::oauth::token::Token;
use crate::oauth::types::{GrantTokensOptions, PolicyDecision, TokenResponseData, TokenSet};

type ExchangeFn = dyn Fn(&GrantTokensOptions) -> Result<TokenSet, GrantError> + Send + Sync;

/// Grant manager with scripted responses that records every call
pub struct MockGrantManager {
    exchange: Box<ExchangeFn>,
    user_info: Option<UserInfoClaims>,
    exchanges: Mutex<Vec<GrantTokensOptions>>,
    user_info_calls: AtomicUsize,
}

impl Default for MockGrantManager {
    fn default() -> Self {
        Self {
            exchange: Box::new(|_| Err(exchange_error(400))),
            user_info: None,
            exchanges: Mutex::new(Vec::new()),
            user_info_calls: AtomicUsize::new(0),
        }
    }
}

impl MockGrantManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exchange(
        mut self,
        exchange: impl Fn(&GrantTokensOptions) -> Result<TokenSet, GrantError> + Send + Sync + 'static,
    ) -> Self {
        self.exchange = Box::new(exchange);
        self
    }

    /// Answer user-info calls with claims for `username`
    pub fn with_user(mut self, username: &str) -> Self {
        self.user_info = Some(user_claims(username));
        self
    }

    pub fn exchanges(&self) -> Vec<GrantTokensOptions> {
        self.exchanges.lock().unwrap().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().unwrap().len()
    }

    pub fn user_info_count(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantManager for MockGrantManager {
    async fn exchange_grant(&self, options: GrantTokensOptions) -> Result<TokenSet, GrantError> {
        self.exchanges.lock().unwrap().push(options.clone());
        (self.exchange)(&options)
    }

    async fn user_info(&self, _access_token: &Token) -> Result<UserInfoClaims, GrantError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.user_info.clone().ok_or_else(|| exchange_error(401))
    }
}

/// Policy enforcer with a fixed outcome that records every permission set
pub struct MockPolicyEnforcer {
    outcome: Result<PolicyDecision, u16>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockPolicyEnforcer {
    pub fn granting() -> Self {
        Self::with_outcome(Ok(PolicyDecision::Granted))
    }

    pub fn denying() -> Self {
        Self::with_outcome(Ok(PolicyDecision::Denied))
    }

    /// Fail every call with an unexpected status
    pub fn failing(status: u16) -> Self {
        Self::with_outcome(Err(status))
    }

    fn with_outcome(outcome: Result<PolicyDecision, u16>) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyEnforcer for MockPolicyEnforcer {
    async fn enforce(
        &self,
        _access_token: &Token,
        permissions: &[String],
    ) -> Result<PolicyDecision, PolicyError> {
        self.calls.lock().unwrap().push(permissions.to_vec());
        self.outcome.map_err(PolicyError::UnexpectedStatus)
    }
}

pub fn exchange_error(status_code: u16) -> GrantError {
    GrantError::Exchange {
        status_code,
        payload: GrantErrorPayload {
            error: Some("invalid_grant".to_string()),
            message: "Token is not active".to_string(),
            status_code,
        },
    }
}

/// A successful exchange result for the configured client
pub fn token_set(access_token: String, refresh_token: Option<String>) -> TokenSet {
    TokenSet::from_response(
        TokenResponseData {
            access_token: Some(access_token),
            refresh_token,
            expires_in: Some(300),
            refresh_expires_in: Some(1800),
            token_type: Some("Bearer".to_string()),
            scope: Some("openid profile".to_string()),
            ..TokenResponseData::default()
        },
        "portal",
    )
}

pub fn user_claims(username: &str) -> UserInfoClaims {
    let serde_json::Value::Object(claims) = serde_json::json!({
        "sub": format!("id-{username}"),
        "email_verified": true,
        "preferred_username": username,
        "email": format!("{username}@example.com"),
    }) else {
        unreachable!()
    };
    claims
}
