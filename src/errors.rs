//! Standardized error types following the `error-kauth-<domain>-<number>` format.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-kauth-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-kauth-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-kauth-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-kauth-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-kauth-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when the identity provider base URL is not a valid absolute URL
    #[error("error-kauth-config-6 Invalid base URL '{0}': {1}")]
    InvalidUrl(String, String),
}

/// An `Authorization` header that could not be turned into a token.
///
/// Never surfaced to callers: the resolver logs it and yields no token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    /// Single-value header rejected because strict mode is on
    #[error("error-kauth-credentials-1 Malformed authorization header: {0}")]
    Malformed(String),

    /// Header scheme other than `Bearer`
    #[error("error-kauth-credentials-2 Unsupported authorization scheme: {0}")]
    UnsupportedScheme(String),
}

/// Error body reported by the identity provider for a rejected grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantErrorPayload {
    /// OAuth error code, e.g. `invalid_grant`
    pub error: Option<String>,
    /// Human readable `error_description`, empty when absent
    pub message: String,
    /// HTTP status returned by the token endpoint
    pub status_code: u16,
}

/// Token endpoint / grant exchange errors
#[derive(Debug, Error)]
pub enum GrantError {
    /// None of the refresh, authorization code, or password shapes was satisfiable
    #[error("error-kauth-grant-1 Missing username, authorizationCode or refreshToken")]
    MissingCredentials,

    /// The identity provider answered with a non-2xx status
    #[error("error-kauth-grant-2 Grant exchange rejected with status {status_code}: {}", .payload.message)]
    Exchange {
        status_code: u16,
        payload: GrantErrorPayload,
    },

    /// The identity provider could not be reached
    #[error("error-kauth-grant-3 Identity provider request failed: {0}")]
    Transport(String),

    /// The identity provider answered 2xx with an unreadable body
    #[error("error-kauth-grant-4 Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

impl GrantError {
    /// HTTP status of a provider rejection, if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GrantError::Exchange { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Rejections below 500 are treated as "unauthenticated" rather than fatal
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_some_and(|status| status < 500)
    }
}

/// Session persistence errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying session could not be destroyed
    #[error("error-kauth-session-1 Session destroy failed: {0}")]
    DestroyFailed(String),

    /// The session store failed to load or save a record
    #[error("error-kauth-session-2 Session storage failed: {0}")]
    Storage(String),
}

/// Policy decision point errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy decision point could not be reached
    #[error("error-kauth-policy-1 Policy decision request failed: {0}")]
    Transport(String),

    /// The policy decision point answered with a status that is neither a grant nor a denial
    #[error("error-kauth-policy-2 Policy decision point returned status {0}")]
    UnexpectedStatus(u16),

    /// The policy decision point answered with an unreadable body
    #[error("error-kauth-policy-3 Invalid policy decision response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the request-scoped authentication service
#[derive(Debug, Error)]
pub enum KeycloakError {
    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

pub type Result<T> = std::result::Result<T, KeycloakError>;

/// A guard failed for a reason other than a denial
#[derive(Debug, Error)]
#[error("error-kauth-guard-1 Guard evaluation failed: {0}")]
pub struct GuardError(#[from] pub KeycloakError);

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "guard evaluation failed");
        let status = match &self.0 {
            KeycloakError::Grant(_) | KeycloakError::Policy(_) => StatusCode::BAD_GATEWAY,
            KeycloakError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": "server_error",
            "error_description": self.0.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(status_code: u16) -> GrantError {
        GrantError::Exchange {
            status_code,
            payload: GrantErrorPayload {
                error: Some("invalid_grant".to_string()),
                message: "Token is not active".to_string(),
                status_code,
            },
        }
    }

    #[test]
    fn test_grant_error_classification() {
        assert!(exchange(400).is_client_error());
        assert!(exchange(401).is_client_error());
        assert!(!exchange(500).is_client_error());
        assert!(!exchange(503).is_client_error());
        assert!(!GrantError::Transport("connection refused".to_string()).is_client_error());
        assert!(!GrantError::MissingCredentials.is_client_error());
        assert_eq!(exchange(400).status_code(), Some(400));
        assert_eq!(GrantError::MissingCredentials.status_code(), None);
    }

    #[test]
    fn test_error_codes_in_messages() {
        assert!(
            GrantError::MissingCredentials
                .to_string()
                .starts_with("error-kauth-grant-1")
        );
        let message = exchange(401).to_string();
        assert!(message.starts_with("error-kauth-grant-2"));
        assert!(message.contains("Token is not active"));
        assert!(
            SessionError::DestroyFailed("gone".to_string())
                .to_string()
                .starts_with("error-kauth-session-1")
        );
    }

    #[test]
    fn test_guard_error_status() {
        let response = GuardError(KeycloakError::Grant(exchange(502))).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = GuardError(KeycloakError::Session(SessionError::Storage(
            "lock poisoned".to_string(),
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
