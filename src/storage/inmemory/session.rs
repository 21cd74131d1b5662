//! In-memory session storage implementation

use crate::errors::SessionError;
use crate::storage::traits::{Result, SessionRecord, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Idle lifetime of a session when none is configured
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(24);

#[derive(Clone, Debug)]
struct StoredSession {
    record: SessionRecord,
    expires_at: DateTime<Utc>,
}

/// In-memory session store keyed by session id.
///
/// Every save pushes the session's expiry `ttl` into the future. Expired
/// sessions are never loaded and are dropped by
/// [`SessionStore::cleanup_expired_sessions`].
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored sessions
    pub fn len(&self) -> Result<usize> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Storage(format!("Lock error: {}", e)))?;
        Ok(sessions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Storage(format!("Lock error: {}", e)))?;

        match sessions.get(session_id) {
            Some(stored) if stored.expires_at > Utc::now() => Ok(Some(stored.record.clone())),
            Some(_) => {
                sessions.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Storage(format!("Lock error: {}", e)))?;
        let stored = StoredSession {
            record: record.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        sessions.insert(session_id.to_string(), stored);
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::DestroyFailed(format!("Lock error: {}", e)))?;
        sessions.remove(session_id);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Storage(format!("Lock error: {}", e)))?;

        let now = Utc::now();
        let initial_count = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);

        Ok(initial_count - sessions.len())
    }
}
