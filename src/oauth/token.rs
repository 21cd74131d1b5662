//! Decoded JWT access and refresh tokens.
//!
//! Signature verification belongs to the identity provider; this module only
//! decodes the claims needed for expiry, issuer, role, and scope decisions.

use base64::prelude::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role list as found under `realm_access` and `resource_access.<client>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims carried by a Keycloak-issued JWT
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time, seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Authorized party: the client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Token type, e.g. `Bearer` or `Refresh`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Space separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RoleAccess>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub resource_access: HashMap<String, RoleAccess>,

    #[serde(flatten)]
    pub additional_claims: HashMap<String, serde_json::Value>,
}

/// A raw token string together with its decoded claims.
///
/// A value that does not decode as a JWT keeps its raw string but gets
/// `exp = 0`, so it is always expired.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    token: String,
    client_id: String,
    content: TokenClaims,
}

impl Token {
    /// Parse `raw` for the configured `client_id`
    pub fn new(raw: impl Into<String>, client_id: impl Into<String>) -> Self {
        let token = raw.into();
        let content = decode_claims(&token).unwrap_or_else(|| {
            tracing::debug!("token payload could not be decoded, treating as expired");
            TokenClaims {
                exp: Some(0),
                ..TokenClaims::default()
            }
        });
        Self {
            token,
            client_id: client_id.into(),
            content,
        }
    }

    /// The raw token string as presented
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The client id this token was parsed for (the configured client)
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn content(&self) -> &TokenClaims {
        &self.content
    }

    pub fn subject(&self) -> Option<&str> {
        self.content.sub.as_deref()
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.content.exp
    }

    /// The client the identity provider issued this token to
    pub fn issued_to(&self) -> Option<&str> {
        self.content.azp.as_deref()
    }

    pub fn is_expired(&self) -> bool {
        match self.content.exp {
            Some(exp) => exp <= Utc::now().timestamp(),
            None => false,
        }
    }

    /// Role check using the identity provider naming convention:
    /// `realm:<role>`, `<client>:<role>`, or a bare role of the configured client.
    pub fn has_role(&self, name: &str) -> bool {
        if self.client_id.is_empty() {
            return false;
        }
        match name.split_once(':') {
            None => self.has_application_role(&self.client_id, name),
            Some(("realm", role)) => self.has_realm_role(role),
            Some((app, role)) => self.has_application_role(app, role),
        }
    }

    pub fn has_application_role(&self, app_name: &str, role_name: &str) -> bool {
        self.content
            .resource_access
            .get(app_name)
            .is_some_and(|access| access.roles.iter().any(|role| role == role_name))
    }

    pub fn has_realm_role(&self, role_name: &str) -> bool {
        self.content
            .realm_access
            .as_ref()
            .is_some_and(|access| access.roles.iter().any(|role| role == role_name))
    }

    /// Realm roles prefixed with `realm:` followed by the configured client's roles
    pub fn roles(&self) -> Vec<String> {
        let realm_roles = self
            .content
            .realm_access
            .iter()
            .flat_map(|access| access.roles.iter())
            .map(|role| format!("realm:{role}"));
        let client_roles = self
            .content
            .resource_access
            .get(&self.client_id)
            .into_iter()
            .flat_map(|access| access.roles.iter().cloned());
        realm_roles.chain(client_roles).collect()
    }

    /// Granted scopes; an absent `scope` claim yields a single empty entry
    pub fn scopes(&self) -> Vec<String> {
        self.content
            .scope
            .as_deref()
            .unwrap_or_default()
            .split(' ')
            .map(str::to_string)
            .collect()
    }
}

fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}
