//! Request handle consumed by the authentication core.
//!
//! The framework boundary builds an [`AuthRequest`] once per incoming request
//! and hands it to the core through a [`RequestContext`].

use http::HeaderMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::SessionError;
use crate::oauth::types::{Grant, UserInfo};
use crate::storage::{SessionRecord, SessionStore};

/// Transient identity attached to the request (`req.kauth`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub grant: Option<Grant>,
    pub user_info: Option<UserInfo>,
}

/// A loaded session: its id, its record, and the store able to destroy it
pub struct Session {
    id: String,
    record: SessionRecord,
    store: Option<Arc<dyn SessionStore>>,
    is_new: bool,
    destroyed: bool,
}

impl Session {
    /// Session backed by `store`
    pub fn new(id: impl Into<String>, record: SessionRecord, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: id.into(),
            record,
            store: Some(store),
            is_new: false,
            destroyed: false,
        }
    }

    /// Session without a store; destroying it is a no-op
    pub fn detached(id: impl Into<String>, record: SessionRecord) -> Self {
        Self {
            id: id.into(),
            record,
            store: None,
            is_new: false,
            destroyed: false,
        }
    }

    /// Mark the session as created during this request
    pub fn into_new(mut self) -> Self {
        self.is_new = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut SessionRecord {
        &mut self.record
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Write the record back to its store
    pub async fn save(&self) -> Result<(), SessionError> {
        match &self.store {
            Some(store) if !self.destroyed => store.save(&self.id, &self.record).await,
            _ => Ok(()),
        }
    }

    /// Destroy the session in its store; a detached session resolves without doing anything
    pub async fn destroy(&mut self) -> Result<(), SessionError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .destroy(&self.id)
            .await
            .map_err(|err| match err {
                SessionError::DestroyFailed(reason) | SessionError::Storage(reason) => {
                    SessionError::DestroyFailed(reason)
                }
            })?;
        self.destroyed = true;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("record", &self.record)
            .field("has_store", &self.store.is_some())
            .field("is_new", &self.is_new)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

/// Uniform request handle used by the authentication state machine and guards
#[derive(Debug, Default)]
pub struct AuthRequest {
    pub headers: HeaderMap,
    pub kauth: AuthContext,
    pub session: Option<Session>,
    /// Set by the policy decision point when a permission check fails
    pub resource_denied: bool,
}

impl AuthRequest {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    }

    /// External origin of the request as `proto://host`, honoring forwarding headers.
    ///
    /// `x-forwarded-host` is used verbatim. `x-forwarded-port` only completes a
    /// `host` header that carries no port of its own. Returns `None` when no
    /// host can be determined.
    pub fn base_url(&self) -> Option<String> {
        let host = match (self.header("x-forwarded-host"), self.header("host")) {
            (Some(forwarded), _) => forwarded.to_string(),
            (None, Some(host)) => match self.header("x-forwarded-port") {
                Some(port) if !host.contains(':') => format!("{host}:{port}"),
                _ => host.to_string(),
            },
            (None, None) => return None,
        };
        let proto = self.header("x-forwarded-proto").unwrap_or("http");
        Some(format!("{proto}://{host}"))
    }
}

/// GraphQL execution context carrying an optional request
#[derive(Debug, Default)]
pub struct GraphqlContext<'a> {
    pub req: Option<&'a mut AuthRequest>,
}

/// Shape of the incoming context, resolved once at the framework boundary
#[derive(Debug)]
pub enum RequestContext<'a> {
    Http(&'a mut AuthRequest),
    Graphql(GraphqlContext<'a>),
}

impl<'a> RequestContext<'a> {
    /// The request carried by this context, if any
    pub fn into_request(self) -> Option<&'a mut AuthRequest> {
        match self {
            RequestContext::Http(req) => Some(req),
            RequestContext::Graphql(ctx) => ctx.req,
        }
    }
}

impl<'a> From<&'a mut AuthRequest> for RequestContext<'a> {
    fn from(req: &'a mut AuthRequest) -> Self {
        RequestContext::Http(req)
    }
}
