//! Storage trait definitions for session records.

use crate::errors::SessionError;
use crate::oauth::types::UserInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, SessionError>;

/// The `kauth` namespace of a session record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KauthSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

/// Everything the integration keeps in a browser session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kauth: Option<KauthSession>,

    /// Mirror of the current access token string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.kauth.is_none() && self.token.is_none()
    }
}

/// Trait for loading, saving, and destroying session records keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session record, `None` when the id is unknown
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Insert or replace a session record
    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()>;

    /// Remove a session record; unknown ids are not an error
    async fn destroy(&self, session_id: &str) -> Result<()>;

    /// Drop every session past its expiry, returning how many were removed
    async fn cleanup_expired_sessions(&self) -> Result<usize>;
}
