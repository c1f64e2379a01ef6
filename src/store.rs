//! Session and token persistence boundary.
//!
//! A [`SessionStore`] owns passwordless accounts, sessions and the provider
//! tokens bound to each session. [`MemoryStore`] is a process-local
//! implementation suitable for tests and single-node deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::nonce::{generate_session_token, unix_now};
use crate::{OAuthError, TokenBundle};

/// Optional profile fields merged into the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bio {
    pub fname: Option<String>,
    pub email: Option<String>,
    pub site: Option<String>,
    /// Set when the provider supplied an e-mail address.
    pub email_verified: bool,
}

impl Bio {
    fn merge(&mut self, other: Bio) {
        if other.fname.is_some() {
            self.fname = other.fname;
        }
        if other.email.is_some() {
            self.email = other.email;
            self.email_verified = true;
        }
        if other.site.is_some() {
            self.site = other.site;
        }
        self.email_verified |= other.email_verified;
    }
}

/// Everything written for one successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provision {
    /// Composite account name, `<percent-encoded uname>:<uservice>`.
    pub uname: String,
    /// `oauth<type>[<name>]`.
    pub uservice: String,
    pub bio: Bio,
    pub tokens: TokenBundle,
    /// Session lifetime in seconds.
    pub session_ttl: u64,
}

/// A freshly issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub uid: u64,
    pub sid: u64,
    pub token: String,
    /// Unix seconds.
    pub expires_at: u64,
}

/// Most recent token row of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub id: u64,
    pub sid: u64,
    pub uid: u64,
    pub tokens: TokenBundle,
    pub expires_at: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn session_is_valid(&self, session_token: &str) -> Result<bool, OAuthError>;

    /// Creates or reuses the account, merges the bio, opens a session and
    /// writes the tokens. The session token must not be observable before
    /// the token row is.
    async fn provision(&self, provision: Provision) -> Result<SessionGrant, OAuthError>;

    async fn tokens_for_session(
        &self,
        session_token: &str,
    ) -> Result<Option<StoredTokens>, OAuthError>;

    /// Deletes the session and its token rows. Returns whether it existed.
    async fn revoke_session(&self, session_token: &str) -> Result<bool, OAuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: u64,
    pub uname: String,
    pub uservice: String,
    pub bio: Bio,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    sid: u64,
    uid: u64,
    expires_at: u64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    users: Vec<UserRecord>,
    sessions: HashMap<String, SessionRecord>,
    tokens: Vec<StoredTokens>,
    next_uid: u64,
    next_sid: u64,
    next_token_id: u64,
}

impl MemoryInner {
    /// Drops sessions past their expiry together with their token rows.
    fn purge_expired(&mut self, now: u64) {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        if self.sessions.len() == before {
            return;
        }
        let live: HashSet<u64> = self.sessions.values().map(|session| session.sid).collect();
        self.tokens.retain(|row| live.contains(&row.sid));
        tracing::debug!(removed = before - self.sessions.len(), "expired sessions purged");
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user(&self, uname: &str) -> Option<UserRecord> {
        let inner = self.inner.read().await;
        inner.users.iter().find(|user| user.uname == uname).cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn token_rows(&self) -> Vec<StoredTokens> {
        self.inner.read().await.tokens.clone()
    }

    /// Moves a session's expiry, for exercising expiration.
    pub async fn set_session_expiry(&self, session_token: &str, expires_at: u64) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(session) = inner.sessions.get_mut(session_token) else {
            return false;
        };
        session.expires_at = expires_at;
        let sid = session.sid;
        for row in inner.tokens.iter_mut().filter(|row| row.sid == sid) {
            row.expires_at = expires_at;
        }
        true
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session_is_valid(&self, session_token: &str) -> Result<bool, OAuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .get(session_token)
            .is_some_and(|session| session.expires_at > unix_now()))
    }

    async fn provision(&self, provision: Provision) -> Result<SessionGrant, OAuthError> {
        let token = generate_session_token()?;
        let expires_at = unix_now().saturating_add(provision.session_ttl);

        // single write guard, so the session and its tokens appear together
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        inner.purge_expired(unix_now());
        let uid = match inner
            .users
            .iter_mut()
            .find(|user| user.uname == provision.uname)
        {
            Some(user) => {
                user.bio.merge(provision.bio);
                user.uid
            }
            None => {
                inner.next_uid += 1;
                let uid = inner.next_uid;
                let mut bio = Bio::default();
                bio.merge(provision.bio);
                inner.users.push(UserRecord {
                    uid,
                    uname: provision.uname,
                    uservice: provision.uservice,
                    bio,
                });
                uid
            }
        };

        inner.next_sid += 1;
        let sid = inner.next_sid;
        inner.next_token_id += 1;
        let id = inner.next_token_id;
        inner.tokens.push(StoredTokens {
            id,
            sid,
            uid,
            tokens: provision.tokens,
            expires_at,
        });
        inner.sessions.insert(
            token.clone(),
            SessionRecord {
                sid,
                uid,
                expires_at,
            },
        );
        tracing::debug!(uid, sid, "session provisioned");

        Ok(SessionGrant {
            uid,
            sid,
            token,
            expires_at,
        })
    }

    async fn tokens_for_session(
        &self,
        session_token: &str,
    ) -> Result<Option<StoredTokens>, OAuthError> {
        let inner = self.inner.read().await;
        let Some(session) = inner.sessions.get(session_token) else {
            return Ok(None);
        };
        if session.expires_at <= unix_now() {
            return Ok(None);
        }
        Ok(inner
            .tokens
            .iter()
            .filter(|row| row.sid == session.sid)
            .max_by_key(|row| row.id)
            .cloned())
    }

    async fn revoke_session(&self, session_token: &str) -> Result<bool, OAuthError> {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.remove(session_token) else {
            return Ok(false);
        };
        inner.tokens.retain(|row| row.sid != session.sid);
        tracing::debug!(uid = session.uid, sid = session.sid, "session revoked");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceType;

    fn provision(uname: &str, email: Option<&str>) -> Provision {
        Provision {
            uname: format!("{uname}:oauth20[reddit]"),
            uservice: "oauth20[reddit]".to_string(),
            bio: Bio {
                email: email.map(str::to_string),
                ..Bio::default()
            },
            tokens: TokenBundle {
                service_type: ServiceType::OAuth20,
                service_name: "reddit".to_string(),
                access_token: format!("at-{uname}"),
                access_token_secret: None,
                refresh_token: Some("rt".to_string()),
                expires_in: None,
                token_type: None,
                scope: None,
            },
            session_ttl: 3600,
        }
    }

    #[tokio::test]
    async fn provision_opens_a_session_with_tokens() {
        let store = MemoryStore::new();
        let grant = store.provision(provision("john", None)).await.unwrap();

        assert!(store.session_is_valid(&grant.token).await.unwrap());
        let row = store.tokens_for_session(&grant.token).await.unwrap().unwrap();
        assert_eq!(row.sid, grant.sid);
        assert_eq!(row.tokens.access_token, "at-john");
        assert!(!store.session_is_valid("nope").await.unwrap());
    }

    #[tokio::test]
    async fn accounts_are_reused_and_bio_merged() {
        let store = MemoryStore::new();
        let first = store.provision(provision("john", None)).await.unwrap();
        let second = store
            .provision(provision("john", Some("john@example.net")))
            .await
            .unwrap();

        assert_eq!(first.uid, second.uid);
        assert_ne!(first.token, second.token);
        assert_eq!(store.user_count().await, 1);
        assert_eq!(store.session_count().await, 2);

        let user = store.user("john:oauth20[reddit]").await.unwrap();
        assert_eq!(user.bio.email.as_deref(), Some("john@example.net"));
        assert!(user.bio.email_verified);
    }

    #[tokio::test]
    async fn expired_sessions_have_no_tokens() {
        let store = MemoryStore::new();
        let grant = store.provision(provision("john", None)).await.unwrap();
        assert!(store.set_session_expiry(&grant.token, 1).await);

        assert!(!store.session_is_valid(&grant.token).await.unwrap());
        assert!(store.tokens_for_session(&grant.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoking_cascades_to_tokens() {
        let store = MemoryStore::new();
        let kept = store.provision(provision("jane", None)).await.unwrap();
        let grant = store.provision(provision("john", None)).await.unwrap();

        assert!(store.revoke_session(&grant.token).await.unwrap());
        assert!(!store.revoke_session(&grant.token).await.unwrap());
        let rows = store.token_rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sid, kept.sid);
    }

    #[tokio::test]
    async fn provisioning_purges_expired_sessions() {
        let store = MemoryStore::new();
        let stale = store.provision(provision("jane", None)).await.unwrap();
        assert!(store.set_session_expiry(&stale.token, 1).await);

        let fresh = store.provision(provision("john", None)).await.unwrap();
        assert_eq!(store.session_count().await, 1);
        let rows = store.token_rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sid, fresh.sid);
        assert!(!store.revoke_session(&stale.token).await.unwrap());
        assert_eq!(store.user_count().await, 2);
    }
}
