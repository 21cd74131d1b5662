//! Request-scoped authentication state machine.
//!
//! A [`KeycloakService`] borrows one [`AuthRequest`] for its whole lifetime.
//! It resolves the request's access token (refreshing it at most once per
//! init cycle), builds the grant, resolves user info, and answers
//! authentication, role, and permission questions about the request.

use std::sync::Arc;

use crate::config::KeycloakOptions;
use crate::errors::Result;
use crate::oauth::grant_manager::GrantManager;
use crate::oauth::policy::PolicyEnforcer;
use crate::oauth::resolver::TokenResolver;
use crate::oauth::session_sync::SessionSynchronizer;
use crate::oauth::token::Token;
use crate::oauth::types::{
    AuthorizationCodeGrantOptions, Grant, GrantTokensOptions, PasswordGrantOptions,
    PolicyDecision, RefreshTokenGrantOptions, RoleRequirement, TokenSet, UserInfo,
};
use crate::oauth::Keycloak;
use crate::request::{AuthContext, AuthRequest};

/// Where the service is in resolving the request's identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unresolved,
    Resolving,
    Resolved { authenticated: bool },
}

pub struct KeycloakService<'r> {
    options: Arc<KeycloakOptions>,
    grant_manager: Arc<dyn GrantManager>,
    policy_enforcer: Arc<dyn PolicyEnforcer>,
    req: &'r mut AuthRequest,
    resolver: TokenResolver,
    access_token: Option<Token>,
    user_info: Option<UserInfo>,
    initialized: bool,
    refresh_attempted: bool,
    state: AuthState,
}

impl<'r> KeycloakService<'r> {
    pub fn new(keycloak: &Keycloak, req: &'r mut AuthRequest) -> Self {
        Self {
            options: keycloak.options.clone(),
            grant_manager: keycloak.grant_manager.clone(),
            policy_enforcer: keycloak.policy_enforcer.clone(),
            req,
            resolver: TokenResolver::new(&keycloak.options),
            access_token: None,
            user_info: None,
            initialized: false,
            refresh_attempted: false,
            state: AuthState::Unresolved,
        }
    }

    pub fn request(&self) -> &AuthRequest {
        &*self.req
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn bearer_token(&mut self) -> Option<Token> {
        self.resolver.bearer_token(&self.req.headers)
    }

    pub fn refresh_token(&mut self) -> Option<Token> {
        self.resolver.refresh_token(self.req.session.as_ref())
    }

    /// Resolve the grant and user info for this request.
    ///
    /// Runs once per service unless `force` is set, which also allows one more
    /// refresh exchange.
    pub async fn init(&mut self, force: bool) -> Result<()> {
        if self.initialized && !force {
            return Ok(());
        }
        if force {
            self.refresh_attempted = false;
        }
        self.state = AuthState::Resolving;
        match self.resolve(force).await {
            Ok(()) => {
                self.initialized = true;
                let authenticated = self.evaluate_authenticated(self.access_token.as_ref());
                self.state = AuthState::Resolved { authenticated };
                Ok(())
            }
            Err(err) => {
                self.state = AuthState::Unresolved;
                Err(err)
            }
        }
    }

    /// The grant attached to the request, initializing if there is none yet
    pub async fn get_grant(&mut self) -> Result<Option<Grant>> {
        if let Some(grant) = &self.req.kauth.grant {
            return Ok(Some(grant.clone()));
        }
        self.init(false).await?;
        Ok(self.req.kauth.grant.clone())
    }

    /// The current valid access token, refreshing from the session when needed.
    ///
    /// A header bearer token is authoritative and never refreshed. A refresh
    /// rejected with a 4xx yields `None`; 5xx and transport failures propagate.
    pub async fn get_access_token(&mut self) -> Result<Option<Token>> {
        if let Some(access_token) = &self.access_token {
            return Ok(Some(access_token.clone()));
        }
        if let Some(bearer_token) = self.bearer_token() {
            self.access_token = Some(bearer_token.clone());
            return Ok(Some(bearer_token));
        }

        let mut access_token = self
            .req
            .kauth
            .grant
            .as_ref()
            .map(|grant| grant.access_token.clone())
            .or_else(|| {
                self.req
                    .session
                    .as_ref()
                    .and_then(|session| session.record().kauth.as_ref())
                    .and_then(|kauth| kauth.access_token.as_deref())
                    .map(|raw| Token::new(raw, self.options.client_id.as_str()))
            });

        let needs_refresh = access_token
            .as_ref()
            .is_none_or(|token| !self.issued_by_client(token) || token.is_expired());
        let refresh_token = if needs_refresh {
            self.refresh_token()
                .filter(|token| self.issued_by_client(token))
        } else {
            None
        };

        if let Some(refresh_token) = refresh_token {
            if self.refresh_attempted {
                return Ok(None);
            }
            self.refresh_attempted = true;
            tracing::debug!(subject = ?refresh_token.subject(), "refreshing access token");
            match self
                .grant_manager
                .exchange_grant(GrantTokensOptions::refresh(refresh_token.token()))
                .await
            {
                Ok(tokens) => {
                    SessionSynchronizer::new(&mut *self.req)
                        .persist_tokens(tokens.access_token.as_ref(), tokens.refresh_token.as_ref());
                    if let Some(refresh_token) = tokens.refresh_token {
                        self.resolver.set_refresh_token(refresh_token);
                    }
                    if let Some(refreshed) = tokens.access_token {
                        access_token = Some(refreshed);
                    }
                }
                Err(err) if err.is_client_error() => {
                    tracing::error!(
                        status_code = ?err.status_code(),
                        error = %err,
                        "refresh token exchange rejected"
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.access_token = access_token.clone();
        Ok(access_token)
    }

    /// Realm roles prefixed with `realm:` followed by this client's roles
    pub async fn get_roles(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.get_access_token().await?.map(|token| token.roles()))
    }

    /// Scopes granted to the access token
    pub async fn get_scopes(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.get_access_token().await?.map(|token| token.scopes()))
    }

    /// Resolved identity for the request.
    ///
    /// Without `force` the memoized value, the request's auth context and then
    /// (only when no bearer header is present) the session are consulted before
    /// asking the provider. With `force` the provider is always asked.
    pub async fn get_user_info(&mut self, force: bool) -> Result<Option<UserInfo>> {
        if force {
            self.user_info = None;
        } else {
            if let Some(user_info) = &self.user_info {
                return Ok(Some(user_info.clone()));
            }
            if let Some(user_info) = self.req.kauth.user_info.clone() {
                self.user_info = Some(user_info.clone());
                return Ok(Some(user_info));
            }
            if self.bearer_token().is_none() {
                let stored = self
                    .req
                    .session
                    .as_ref()
                    .and_then(|session| session.record().kauth.as_ref())
                    .and_then(|kauth| kauth.user_info.clone());
                if let Some(user_info) = stored {
                    self.user_info = Some(user_info.clone());
                    return Ok(Some(user_info));
                }
            }
        }

        let Some(access_token) = self.get_access_token().await? else {
            return Ok(None);
        };
        if access_token.is_expired() {
            tracing::debug!("access token expired, skipping user info lookup");
            return Ok(None);
        }
        match self.grant_manager.user_info(&access_token).await {
            Ok(claims) => {
                let user_info = UserInfo::from_provider_claims(claims);
                self.user_info = Some(user_info.clone());
                Ok(Some(user_info))
            }
            Err(err) if err.is_client_error() => {
                tracing::warn!(error = %err, "user info rejected by identity provider");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_user_id(&mut self) -> Result<Option<String>> {
        Ok(self.get_user_info(false).await?.and_then(|info| info.sub))
    }

    pub async fn get_username(&mut self) -> Result<Option<String>> {
        Ok(self
            .get_user_info(false)
            .await?
            .and_then(|info| info.preferred_username))
    }

    pub async fn is_authenticated(&mut self) -> Result<bool> {
        self.init(false).await?;
        let access_token = self.get_access_token().await?;
        let authenticated = self.evaluate_authenticated(access_token.as_ref());
        self.state = AuthState::Resolved { authenticated };
        Ok(authenticated)
    }

    /// Authenticated and holding any one of `roles`; an empty list only requires authentication
    pub async fn is_authorized_by_roles(&mut self, roles: &[RoleRequirement]) -> Result<bool> {
        if !self.is_authenticated().await? {
            return Ok(false);
        }
        if roles.is_empty() {
            return Ok(true);
        }
        let access_token = self.get_access_token().await?;
        Ok(access_token
            .is_some_and(|token| roles.iter().any(|role| role.is_satisfied_by(&token))))
    }

    /// Exchange a username and password for tokens.
    ///
    /// Returns `None` when the issued access token belongs to another client.
    pub async fn password_grant(
        &mut self,
        options: PasswordGrantOptions,
        persist_session: bool,
    ) -> Result<Option<TokenSet>> {
        let tokens = self
            .grant_manager
            .exchange_grant(GrantTokensOptions::password(
                options.username,
                options.password,
                options.scope,
            ))
            .await?;
        self.adopt_tokens(tokens, persist_session).await
    }

    pub async fn refresh_token_grant(
        &mut self,
        options: RefreshTokenGrantOptions,
        persist_session: bool,
    ) -> Result<Option<TokenSet>> {
        let tokens = self
            .grant_manager
            .exchange_grant(GrantTokensOptions::refresh(options.refresh_token))
            .await?;
        self.adopt_tokens(tokens, persist_session).await
    }

    pub async fn authorization_code_grant(
        &mut self,
        options: AuthorizationCodeGrantOptions,
        persist_session: bool,
    ) -> Result<Option<TokenSet>> {
        let tokens = self
            .grant_manager
            .exchange_grant(GrantTokensOptions::authorization_code(
                options.code,
                options.redirect_uri,
            ))
            .await?;
        self.adopt_tokens(tokens, persist_session).await
    }

    /// Forget all identity for this request and destroy its session
    pub async fn logout(&mut self) -> Result<()> {
        self.access_token = None;
        self.user_info = None;
        self.resolver.clear();
        self.initialized = false;
        self.refresh_attempted = false;
        self.state = AuthState::Unresolved;
        self.req.kauth = AuthContext::default();

        let Some(session) = self.req.session.as_mut() else {
            return Ok(());
        };
        let record = session.record_mut();
        record.kauth = None;
        record.token = None;
        session.destroy().await?;
        Ok(())
    }

    /// Ask the policy decision point for every `resource:scope` permission at once
    pub async fn enforce(&mut self, permissions: &[String]) -> Result<bool> {
        self.init(false).await?;
        let decision = match self.get_access_token().await? {
            Some(access_token) => {
                self.policy_enforcer
                    .enforce(&access_token, permissions)
                    .await?
            }
            None => PolicyDecision::Denied,
        };
        self.req.resource_denied = !decision.is_granted();
        Ok(decision.is_granted())
    }

    /// Whether `token` was issued to the configured client; always true unless enforcement is on
    pub fn issued_by_client(&self, token: &Token) -> bool {
        if !self.options.enforce_issued_by_client {
            return true;
        }
        token.issued_to() == Some(self.options.client_id.as_str())
    }

    fn evaluate_authenticated(&self, access_token: Option<&Token>) -> bool {
        let grant_valid = self
            .req
            .kauth
            .grant
            .as_ref()
            .is_none_or(|grant| !grant.is_expired());
        grant_valid
            && access_token.is_some_and(|token| self.issued_by_client(token) && !token.is_expired())
    }

    async fn adopt_tokens(
        &mut self,
        tokens: TokenSet,
        persist_session: bool,
    ) -> Result<Option<TokenSet>> {
        if let Some(access_token) = &tokens.access_token {
            if !self.issued_by_client(access_token) {
                tracing::warn!(
                    issued_to = ?access_token.issued_to(),
                    "rejecting tokens issued to another client"
                );
                return Ok(None);
            }
        }

        // Identity from a previous grant must not outlive it
        self.user_info = None;
        self.req.kauth.user_info = None;
        if let Some(kauth) = self
            .req
            .session
            .as_mut()
            .and_then(|session| session.record_mut().kauth.as_mut())
        {
            kauth.user_info = None;
        }

        if persist_session {
            SessionSynchronizer::new(&mut *self.req)
                .persist_tokens(tokens.access_token.as_ref(), tokens.refresh_token.as_ref());
        }
        if let Some(access_token) = &tokens.access_token {
            self.access_token = Some(access_token.clone());
        }
        if let Some(refresh_token) = &tokens.refresh_token {
            self.resolver.set_refresh_token(refresh_token.clone());
        }
        self.init(true).await?;
        Ok(Some(tokens))
    }

    async fn resolve(&mut self, force: bool) -> Result<()> {
        self.set_grant().await?;
        self.set_user_info(force).await
    }

    async fn set_grant(&mut self) -> Result<()> {
        let Some(access_token) = self.get_access_token().await? else {
            return Ok(());
        };
        let refresh_token = self.refresh_token();
        self.req.kauth.grant = Some(Grant::new(access_token, refresh_token));
        Ok(())
    }

    async fn set_user_info(&mut self, force: bool) -> Result<()> {
        if let Some(user_info) = self.get_user_info(force).await? {
            SessionSynchronizer::new(&mut *self.req).persist_user_info(&user_info);
        }
        Ok(())
    }
}
