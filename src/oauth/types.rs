//! Grant, token exchange, and identity types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::oauth::token::Token;

/// Message attached to every successful exchange
pub const AUTHENTICATION_SUCCESSFUL: &str = "authentication successful";

/// Scope always requested by the password grant
pub const OPENID_SCOPE: &str = "openid";

/// Scope requested by the password grant when the caller supplies none
pub const DEFAULT_PASSWORD_SCOPE: &str = "profile";

/// Access/refresh token pair bound to the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub access_token: Token,
    pub refresh_token: Option<Token>,
    pub id_token: Option<Token>,
    /// Absolute expiry of the access token, seconds since the epoch
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
}

impl Grant {
    /// Build a grant around an access token, taking expiry and type from its claims
    pub fn new(access_token: Token, refresh_token: Option<Token>) -> Self {
        let expires_in = access_token.content().exp;
        let token_type = access_token.content().typ.clone();
        Self {
            access_token,
            refresh_token,
            id_token: None,
            expires_in,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.access_token.is_expired()
    }
}

/// Raw token endpoint response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponseData {
    #[serde(rename = "not-before-policy", skip_serializing_if = "Option::is_none")]
    pub not_before_policy: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Token endpoint error body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenErrorData {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Parsed result of a successful grant exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: Option<Token>,
    pub refresh_token: Option<Token>,
    pub expires_in: Option<i64>,
    pub refresh_expires_in: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub message: String,
}

impl TokenSet {
    pub fn from_response(data: TokenResponseData, client_id: &str) -> Self {
        Self {
            access_token: data.access_token.map(|raw| Token::new(raw, client_id)),
            refresh_token: data.refresh_token.map(|raw| Token::new(raw, client_id)),
            expires_in: data.expires_in,
            refresh_expires_in: data.refresh_expires_in,
            token_type: data.token_type,
            scope: data.scope,
            message: AUTHENTICATION_SUCCESSFUL.to_string(),
        }
    }
}

/// Caller-supplied scopes for the password grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeParam {
    /// Space separated scope string
    Joined(String),
    List(Vec<String>),
}

impl ScopeParam {
    fn into_vec(self) -> Vec<String> {
        match self {
            ScopeParam::Joined(joined) => joined.split(' ').map(str::to_string).collect(),
            ScopeParam::List(list) => list,
        }
    }
}

impl From<&str> for ScopeParam {
    fn from(value: &str) -> Self {
        ScopeParam::Joined(value.to_string())
    }
}

impl From<Vec<String>> for ScopeParam {
    fn from(value: Vec<String>) -> Self {
        ScopeParam::List(value)
    }
}

/// Credentials for a grant exchange.
///
/// Shapes are tried in order: refresh token, authorization code with
/// redirect URI, then password (which needs at least a username).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTokensOptions {
    pub refresh_token: Option<String>,
    pub authorization_code: Option<String>,
    pub redirect_uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<ScopeParam>,
}

/// The satisfiable credential shape selected from [`GrantTokensOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRequest {
    RefreshToken {
        refresh_token: String,
    },
    AuthorizationCode {
        code: String,
        redirect_uri: String,
    },
    Password {
        username: String,
        password: String,
        scope: Vec<String>,
    },
}

impl GrantRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::RefreshToken { .. } => "refresh_token",
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::Password { .. } => "password",
        }
    }
}

impl GrantTokensOptions {
    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    pub fn authorization_code(code: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            authorization_code: Some(code.into()),
            redirect_uri: Some(redirect_uri.into()),
            ..Self::default()
        }
    }

    pub fn password(
        username: impl Into<String>,
        password: impl Into<String>,
        scope: Option<ScopeParam>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            scope,
            ..Self::default()
        }
    }

    /// Pick the credential shape to exchange, or `None` when nothing is satisfiable
    pub fn into_request(self) -> Option<GrantRequest> {
        if let Some(refresh_token) = self.refresh_token.filter(|t| !t.is_empty()) {
            return Some(GrantRequest::RefreshToken { refresh_token });
        }
        if let (Some(code), Some(redirect_uri)) = (
            self.authorization_code.filter(|c| !c.is_empty()),
            self.redirect_uri.filter(|r| !r.is_empty()),
        ) {
            return Some(GrantRequest::AuthorizationCode { code, redirect_uri });
        }
        let username = self.username.filter(|u| !u.is_empty())?;
        let requested = self
            .scope
            .unwrap_or_else(|| ScopeParam::from(DEFAULT_PASSWORD_SCOPE))
            .into_vec();
        let scope = std::iter::once(OPENID_SCOPE.to_string())
            .chain(requested)
            .collect();
        Some(GrantRequest::Password {
            username,
            password: self.password.unwrap_or_default(),
            scope,
        })
    }
}

/// Options for [`crate::oauth::KeycloakService::password_grant`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordGrantOptions {
    pub username: String,
    pub password: String,
    pub scope: Option<ScopeParam>,
}

/// Options for [`crate::oauth::KeycloakService::refresh_token_grant`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenGrantOptions {
    pub refresh_token: String,
}

/// Options for [`crate::oauth::KeycloakService::authorization_code_grant`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCodeGrantOptions {
    pub code: String,
    pub redirect_uri: String,
}

/// Resolved identity projection.
///
/// Stored in the session in camelCase (`emailVerified`, `preferredUsername`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(flatten)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl UserInfo {
    /// Normalize a provider user-info response.
    ///
    /// `email_verified` and `preferred_username` move into the typed fields
    /// and are removed from the remaining claims.
    pub fn from_provider_claims(mut claims: serde_json::Map<String, serde_json::Value>) -> Self {
        let email_verified = claims
            .remove("email_verified")
            .and_then(|value| value.as_bool());
        let preferred_username = claims
            .remove("preferred_username")
            .and_then(|value| value.as_str().map(str::to_string));
        let sub = claims
            .remove("sub")
            .and_then(|value| value.as_str().map(str::to_string));
        Self {
            email_verified,
            preferred_username,
            sub,
            claims: claims.into_iter().collect(),
        }
    }
}

/// A role requirement for [`crate::oauth::KeycloakService::is_authorized_by_roles`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// The single role must be held
    Role(String),
    /// Every listed role must be held
    All(Vec<String>),
}

impl RoleRequirement {
    pub fn is_satisfied_by(&self, token: &Token) -> bool {
        match self {
            RoleRequirement::Role(role) => token.has_role(role),
            RoleRequirement::All(roles) => roles.iter().all(|role| token.has_role(role)),
        }
    }
}

impl From<&str> for RoleRequirement {
    fn from(value: &str) -> Self {
        RoleRequirement::Role(value.to_string())
    }
}

impl From<Vec<&str>> for RoleRequirement {
    fn from(value: Vec<&str>) -> Self {
        RoleRequirement::All(value.into_iter().map(str::to_string).collect())
    }
}

/// Outcome of a policy decision point evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Granted,
    Denied,
}

impl PolicyDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, PolicyDecision::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::token::test_tokens::*;
    use serde_json::json;

    #[test]
    fn test_grant_request_selection_order() {
        let options = GrantTokensOptions {
            refresh_token: Some("rt".to_string()),
            authorization_code: Some("code".to_string()),
            redirect_uri: Some("https://app/cb".to_string()),
            username: Some("ada".to_string()),
            ..GrantTokensOptions::default()
        };
        assert_eq!(
            options.into_request(),
            Some(GrantRequest::RefreshToken {
                refresh_token: "rt".to_string()
            })
        );

        let options = GrantTokensOptions {
            authorization_code: Some("code".to_string()),
            redirect_uri: Some("https://app/cb".to_string()),
            username: Some("ada".to_string()),
            ..GrantTokensOptions::default()
        };
        assert_eq!(
            options.into_request(),
            Some(GrantRequest::AuthorizationCode {
                code: "code".to_string(),
                redirect_uri: "https://app/cb".to_string(),
            })
        );
    }

    #[test]
    fn test_code_without_redirect_falls_through_to_password() {
        let options = GrantTokensOptions {
            authorization_code: Some("code".to_string()),
            ..GrantTokensOptions::default()
        };
        assert_eq!(options.into_request(), None);

        let options = GrantTokensOptions {
            authorization_code: Some("code".to_string()),
            username: Some("ada".to_string()),
            ..GrantTokensOptions::default()
        };
        assert!(matches!(
            options.into_request(),
            Some(GrantRequest::Password { .. })
        ));
    }

    #[test]
    fn test_password_grant_scopes() {
        let request = GrantTokensOptions::password("ada", "pw", None).into_request();
        assert_eq!(
            request,
            Some(GrantRequest::Password {
                username: "ada".to_string(),
                password: "pw".to_string(),
                scope: vec!["openid".to_string(), "profile".to_string()],
            })
        );

        let request =
            GrantTokensOptions::password("ada", "pw", Some("email roles".into())).into_request();
        let Some(GrantRequest::Password { scope, .. }) = request else {
            panic!("expected password grant");
        };
        assert_eq!(scope, vec!["openid", "email", "roles"]);

        let request = GrantTokensOptions::password(
            "ada",
            "pw",
            Some(vec!["offline_access".to_string()].into()),
        )
        .into_request();
        let Some(GrantRequest::Password { scope, .. }) = request else {
            panic!("expected password grant");
        };
        assert_eq!(scope, vec!["openid", "offline_access"]);
    }

    #[test]
    fn test_password_defaults_to_empty() {
        let options = GrantTokensOptions {
            username: Some("ada".to_string()),
            ..GrantTokensOptions::default()
        };
        let Some(GrantRequest::Password { password, .. }) = options.into_request() else {
            panic!("expected password grant");
        };
        assert_eq!(password, "");
    }

    #[test]
    fn test_missing_credentials() {
        assert_eq!(GrantTokensOptions::default().into_request(), None);
        let options = GrantTokensOptions {
            password: Some("pw".to_string()),
            ..GrantTokensOptions::default()
        };
        assert_eq!(options.into_request(), None);
    }

    #[test]
    fn test_user_info_normalization() {
        let claims = json!({
            "sub": "f3b1c1e0",
            "email_verified": true,
            "preferred_username": "ada",
            "email": "ada@example.com",
            "given_name": "Ada"
        });
        let serde_json::Value::Object(map) = claims else {
            panic!("expected object");
        };
        let user_info = UserInfo::from_provider_claims(map);

        assert_eq!(user_info.email_verified, Some(true));
        assert_eq!(user_info.preferred_username.as_deref(), Some("ada"));
        assert_eq!(user_info.sub.as_deref(), Some("f3b1c1e0"));
        assert!(!user_info.claims.contains_key("email_verified"));
        assert!(!user_info.claims.contains_key("preferred_username"));
        assert_eq!(user_info.claims.get("email"), Some(&json!("ada@example.com")));

        let stored = serde_json::to_value(&user_info).unwrap();
        assert_eq!(stored["emailVerified"], json!(true));
        assert_eq!(stored["preferredUsername"], json!("ada"));
        assert_eq!(stored["given_name"], json!("Ada"));
        assert!(stored.get("preferred_username").is_none());
    }

    #[test]
    fn test_token_set_from_response() {
        let data = TokenResponseData {
            access_token: Some(access_jwt("ada", "portal", 300)),
            refresh_token: Some(refresh_jwt("ada", "portal")),
            expires_in: Some(300),
            refresh_expires_in: Some(1800),
            token_type: Some("Bearer".to_string()),
            scope: Some("openid profile".to_string()),
            ..TokenResponseData::default()
        };
        let tokens = TokenSet::from_response(data, "portal");
        assert_eq!(tokens.message, AUTHENTICATION_SUCCESSFUL);
        assert_eq!(tokens.expires_in, Some(300));
        assert_eq!(
            tokens.access_token.as_ref().and_then(|t| t.subject()),
            Some("ada")
        );
        assert_eq!(
            tokens.refresh_token.as_ref().map(|t| t.client_id()),
            Some("portal")
        );
    }

    #[test]
    fn test_role_requirements() {
        let token = Token::new(
            jwt(json!({
                "realm_access": { "roles": ["admin"] },
                "resource_access": { "portal": { "roles": ["editor"] } }
            })),
            "portal",
        );
        assert!(RoleRequirement::from("editor").is_satisfied_by(&token));
        assert!(RoleRequirement::from(vec!["editor", "realm:admin"]).is_satisfied_by(&token));
        assert!(!RoleRequirement::from(vec!["editor", "publisher"]).is_satisfied_by(&token));
    }

    #[test]
    fn test_grant_expiry_follows_access_token() {
        let grant = Grant::new(Token::new(access_jwt("ada", "portal", -5), "portal"), None);
        assert!(grant.is_expired());
        assert_eq!(grant.token_type.as_deref(), Some("Bearer"));

        let grant = Grant::new(Token::new(access_jwt("ada", "portal", 60), "portal"), None);
        assert!(!grant.is_expired());
    }
}
