//! Environment-based configuration for the Keycloak integration and the demo server.

use anyhow::Result;
use std::time::Duration;

use crate::errors::ConfigError;

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// HTTP client timeout applied to every identity provider call
#[derive(Clone, Debug)]
pub struct HttpClientTimeout(Duration);

/// Idle lifetime of a browser session
#[derive(Clone, Debug)]
pub struct SessionTtl(Duration);

/// Identity provider base URL, validated and stored without a trailing slash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl(String);

/// Boolean switch parsed from the environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flag(bool);

/// Options consumed by the token and grant lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeycloakOptions {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Server root, e.g. `https://sso.example.com`
    pub base_url: String,
    pub realm: String,
    /// Reject `Authorization` values that carry no scheme
    pub strict: bool,
    /// Require tokens to be issued to `client_id` (off by default for lenient deployments)
    pub enforce_issued_by_client: bool,
}

impl KeycloakOptions {
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            realm: realm.into(),
            strict: false,
            enforce_issued_by_client: false,
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_enforce_issued_by_client(mut self, enforce: bool) -> Self {
        self.enforce_issued_by_client = enforce;
        self
    }

    /// `{base_url}/auth/realms/{realm}`
    pub fn realm_url(&self) -> String {
        format!("{}/auth/realms/{}", self.base_url, self.realm)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    pub fn userinfo_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.realm_url())
    }

    /// Load the Keycloak section from `KEYCLOAK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let base_url: BaseUrl = require_env("KEYCLOAK_BASE_URL")?.try_into()?;
        let realm = require_env("KEYCLOAK_REALM")?;
        let client_id = require_env("KEYCLOAK_CLIENT_ID")?;
        let client_secret = optional_env("KEYCLOAK_CLIENT_SECRET").filter(|s| !s.is_empty());
        let strict: Flag = default_env("KEYCLOAK_STRICT", "false").try_into()?;
        let enforce_issued_by_client: Flag =
            default_env("KEYCLOAK_ENFORCE_ISSUED_BY_CLIENT", "false").try_into()?;

        Ok(Self {
            client_id,
            client_secret,
            base_url: base_url.as_ref().clone(),
            realm,
            strict: *strict.as_ref(),
            enforce_issued_by_client: *enforce_issued_by_client.as_ref(),
        })
    }
}

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub user_agent: String,
    pub http_client_timeout: HttpClientTimeout,
    pub session_ttl: SessionTtl,
    pub keycloak: KeycloakOptions,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let default_user_agent = format!("kauth/{}", version()?);
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "10s").try_into()?;
        let session_ttl: SessionTtl = default_env("SESSION_TTL", "24h").try_into()?;
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let keycloak = KeycloakOptions::from_env()?;

        Ok(Self {
            version: version()?,
            http_port,
            user_agent,
            http_client_timeout,
            session_ttl,
            keycloak,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()).into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for HttpClientTimeout {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(10)));
        }
        duration_str::parse(&value)
            .map(Self)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
    }
}

impl AsRef<Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for SessionTtl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(24 * 60 * 60)));
        }
        match duration_str::parse(&value) {
            Ok(ttl) if ttl.is_zero() => Err(ConfigError::DurationParsingFailed(
                value,
                "session lifetime must be positive".to_string(),
            )),
            Ok(ttl) => Ok(Self(ttl)),
            Err(e) => Err(ConfigError::DurationParsingFailed(value, e.to_string())),
        }
    }
}

impl AsRef<Duration> for SessionTtl {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parsed = url::Url::parse(&value)
            .map_err(|e| ConfigError::InvalidUrl(value.clone(), e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(
                value,
                "scheme must be http or https".to_string(),
            ));
        }
        Ok(Self(value.trim_end_matches('/').to_string()))
    }
}

impl AsRef<String> for BaseUrl {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl TryFrom<String> for Flag {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value)),
        }
    }
}

impl AsRef<bool> for Flag {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}
