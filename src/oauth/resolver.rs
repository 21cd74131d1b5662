//! Bearer and refresh token discovery for a single request.

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::config::KeycloakOptions;
use crate::errors::CredentialsError;
use crate::oauth::token::Token;
use crate::request::Session;

/// Request-scoped token resolver.
///
/// The bearer token comes from the `Authorization` header only, the refresh
/// token from the session only. Both are memoized for the lifetime of the
/// resolver.
#[derive(Debug, Clone)]
pub struct TokenResolver {
    client_id: String,
    strict: bool,
    bearer_token: Option<Option<Token>>,
    refresh_token: Option<Token>,
}

impl TokenResolver {
    pub fn new(options: &KeycloakOptions) -> Self {
        Self {
            client_id: options.client_id.clone(),
            strict: options.strict,
            bearer_token: None,
            refresh_token: None,
        }
    }

    /// Token presented in the `Authorization` header, if any
    pub fn bearer_token(&mut self, headers: &HeaderMap) -> Option<Token> {
        if let Some(memoized) = &self.bearer_token {
            return memoized.clone();
        }
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| match parse_authorization(value, self.strict) {
                Ok(raw) => Some(Token::new(raw, self.client_id.as_str())),
                Err(err) => {
                    tracing::debug!(error = %err, "ignoring authorization header");
                    None
                }
            });
        self.bearer_token = Some(token.clone());
        token
    }

    /// Refresh token stored in the session's `kauth` namespace, if any
    pub fn refresh_token(&mut self, session: Option<&Session>) -> Option<Token> {
        if self.refresh_token.is_some() {
            return self.refresh_token.clone();
        }
        self.refresh_token = session
            .and_then(|session| session.record().kauth.as_ref())
            .and_then(|kauth| kauth.refresh_token.as_deref())
            .map(|raw| Token::new(raw, self.client_id.as_str()));
        self.refresh_token.clone()
    }

    /// Adopt a refresh token obtained from a grant exchange
    pub fn set_refresh_token(&mut self, token: Token) {
        self.refresh_token = Some(token);
    }

    /// Forget every memoized token
    pub fn clear(&mut self) {
        self.bearer_token = None;
        self.refresh_token = None;
    }
}

/// Extract the raw token from an `Authorization` header value.
///
/// A value without a space is taken whole unless `strict` is set. Otherwise the
/// value is split on the first space and the scheme must be `Bearer`.
pub fn parse_authorization(value: &str, strict: bool) -> Result<&str, CredentialsError> {
    match value.split_once(' ') {
        None if strict => Err(CredentialsError::Malformed(
            "expected '<scheme> <token>' in strict mode".to_string(),
        )),
        None => Ok(value),
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        Some((scheme, _)) => Err(CredentialsError::UnsupportedScheme(scheme.to_string())),
    }
}
