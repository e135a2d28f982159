use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::store::UserId;

/// Authenticated caller attached to gated requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone)]
struct Session {
    user: SessionUser,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("authentication required")]
    Missing,
    #[error("session is not recognised")]
    Unknown,
    #[error("session has expired")]
    Expired,
    #[error("session store lock poisoned")]
    Poisoned,
}

/// Bearer tokens issued at login, kept in memory.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, user_id: UserId, username: &str) -> Result<String, SessionError> {
        self.issue_at(user_id, username, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: UserId,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let token = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().map_err(|_| SessionError::Poisoned)?;
        // Abandoned tokens are never resolved again, so logins sweep them.
        sessions.retain(|_, session| issued_at - session.issued_at < self.ttl);
        sessions.insert(
            token.clone(),
            Session {
                user: SessionUser {
                    user_id,
                    username: username.trim().to_string(),
                },
                issued_at,
            },
        );
        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> Result<SessionUser, SessionError> {
        self.resolve_at(token, Utc::now())
    }

    fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionUser, SessionError> {
        {
            let sessions = self.sessions.read().map_err(|_| SessionError::Poisoned)?;
            let session = sessions.get(token).ok_or(SessionError::Unknown)?;
            if now - session.issued_at < self.ttl {
                return Ok(session.user.clone());
            }
        }

        self.revoke(token);
        Err(SessionError::Expired)
    }

    /// Returns whether a session was removed.
    pub fn revoke(&self, token: &str) -> bool {
        match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(token).is_some(),
            Err(_) => false,
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
