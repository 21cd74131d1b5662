//! Writes resolved tokens and identity into the session and onto the request.

use crate::oauth::token::Token;
use crate::oauth::types::UserInfo;
use crate::request::AuthRequest;
use crate::storage::KauthSession;

/// Mirrors tokens and user info into `session.kauth` and the request's auth context.
///
/// Every write is idempotent; values that are not provided are left untouched.
pub struct SessionSynchronizer<'a> {
    req: &'a mut AuthRequest,
}

impl<'a> SessionSynchronizer<'a> {
    pub fn new(req: &'a mut AuthRequest) -> Self {
        Self { req }
    }

    /// Store the provided tokens in the session; the access token is also mirrored to `token`
    pub fn persist_tokens(&mut self, access_token: Option<&Token>, refresh_token: Option<&Token>) {
        let Some(session) = self.req.session.as_mut() else {
            return;
        };
        let record = session.record_mut();
        if let Some(access_token) = access_token {
            record.token = Some(access_token.token().to_string());
        }
        let kauth = record.kauth.get_or_insert_with(KauthSession::default);
        if let Some(refresh_token) = refresh_token {
            kauth.refresh_token = Some(refresh_token.token().to_string());
        }
        if let Some(access_token) = access_token {
            kauth.access_token = Some(access_token.token().to_string());
        }
    }

    /// Attach user info to the request and, when present, the session
    pub fn persist_user_info(&mut self, user_info: &UserInfo) {
        self.req.kauth.user_info = Some(user_info.clone());
        if let Some(session) = self.req.session.as_mut() {
            session
                .record_mut()
                .kauth
                .get_or_insert_with(KauthSession::default)
                .user_info = Some(user_info.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::token::test_tokens::*;
    use crate::request::Session;
    use crate::storage::SessionRecord;

    fn request_with_session() -> AuthRequest {
        AuthRequest::default().with_session(Session::detached("sid-1", SessionRecord::default()))
    }

    #[test]
    fn test_persist_tokens() {
        let access = Token::new(access_jwt("ada", "portal", 60), "portal");
        let refresh = Token::new(refresh_jwt("ada", "portal"), "portal");
        let mut req = request_with_session();

        SessionSynchronizer::new(&mut req).persist_tokens(Some(&access), Some(&refresh));

        let record = req.session.as_ref().unwrap().record();
        let kauth = record.kauth.as_ref().unwrap();
        assert_eq!(kauth.access_token.as_deref(), Some(access.token()));
        assert_eq!(kauth.refresh_token.as_deref(), Some(refresh.token()));
        assert_eq!(record.token.as_deref(), Some(access.token()));
    }

    #[test]
    fn test_persist_tokens_keeps_values_not_provided() {
        let access = Token::new(access_jwt("ada", "portal", 60), "portal");
        let refresh = Token::new(refresh_jwt("ada", "portal"), "portal");
        let mut req = request_with_session();
        let mut sync = SessionSynchronizer::new(&mut req);

        sync.persist_tokens(Some(&access), Some(&refresh));
        let newer = Token::new(access_jwt("ada", "portal", 120), "portal");
        sync.persist_tokens(Some(&newer), None);
        sync.persist_tokens(None, None);

        let kauth = req.session.as_ref().unwrap().record().kauth.clone().unwrap();
        assert_eq!(kauth.access_token.as_deref(), Some(newer.token()));
        assert_eq!(kauth.refresh_token.as_deref(), Some(refresh.token()));
    }

    #[test]
    fn test_persist_tokens_creates_namespace_and_is_idempotent() {
        let access = Token::new(access_jwt("ada", "portal", 60), "portal");
        let mut req = request_with_session();

        SessionSynchronizer::new(&mut req).persist_tokens(None, None);
        assert_eq!(
            req.session.as_ref().unwrap().record().kauth,
            Some(KauthSession::default())
        );

        SessionSynchronizer::new(&mut req).persist_tokens(Some(&access), None);
        let once = req.session.as_ref().unwrap().record().clone();
        SessionSynchronizer::new(&mut req).persist_tokens(Some(&access), None);
        assert_eq!(req.session.as_ref().unwrap().record(), &once);
    }

    #[test]
    fn test_persist_user_info() {
        let user_info = UserInfo {
            preferred_username: Some("ada".to_string()),
            sub: Some("f3b1c1e0".to_string()),
            ..UserInfo::default()
        };

        let mut req = request_with_session();
        SessionSynchronizer::new(&mut req).persist_user_info(&user_info);
        assert_eq!(req.kauth.user_info.as_ref(), Some(&user_info));
        let stored = req.session.as_ref().unwrap().record().kauth.clone().unwrap();
        assert_eq!(stored.user_info, Some(user_info.clone()));

        let mut req = AuthRequest::default();
        let access = Token::new(access_jwt("ada", "portal", 60), "portal");
        let mut sync = SessionSynchronizer::new(&mut req);
        sync.persist_user_info(&user_info);
        sync.persist_tokens(Some(&access), None);
        assert_eq!(req.kauth.user_info, Some(user_info));
        assert!(req.session.is_none());
    }
}
