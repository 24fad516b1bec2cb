//! Session storage
//!
//! Sessions map an opaque, generated identifier to a [`UserContext`]
//! snapshot. Expiry slides: every successful read pushes it out by the TTL,
//! never backwards. A deleted identifier is never reissued.
//!
//! [`MemorySessionStore`] is the in-process implementation; external
//! backends implement [`SessionStore`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::context::{DisplayAttributes, UserContext};
use crate::error::Result;

/// Session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Opaque session identifier (random UUIDv4, 122 bits of entropy).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an identifier presented by a caller.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Identifiers are bearer credentials; Debug shows a fingerprint only.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionId")
            .field(&crate::audit::fingerprint(&self.0))
            .finish()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Context snapshot
    pub context: UserContext,
    /// Unix time of creation
    pub created_at: u64,
    /// Unix time at which the session lapses
    pub expires_at: u64,
}

/// Session backend.
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Persist `context` under a new identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`](crate::AuthError::Store) on backend failure.
    async fn create(&self, context: UserContext) -> Result<SessionId>;

    /// Look up a live session, refreshing its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`](crate::AuthError::Store) on backend failure.
    async fn get(&self, id: &SessionId) -> Result<Option<UserContext>>;

    /// Remove a session. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`](crate::AuthError::Store) on backend failure.
    async fn delete(&self, id: &SessionId) -> Result<bool>;

    /// Replace the context of an existing live session. Never creates.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`](crate::AuthError::Store) on backend failure.
    async fn update(&self, id: &SessionId, context: UserContext) -> Result<bool>;
}

/// In-memory session store.
///
/// Expired sessions are removed when touched or by [`purge_expired`]; there is
/// no background task.
///
/// [`purge_expired`]: MemorySessionStore::purge_expired
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Session>,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl_secs: config.ttl_secs,
            clock,
        }
    }

    /// Remove every lapsed session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }

    /// Remove every session of `subject` at `issuer`. Returns how many.
    pub fn delete_subject(&self, subject: &str, issuer: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            !(session.context.subject == subject && session.context.issuer == issuer)
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Number of stored sessions, including lapsed ones not yet purged
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, context: UserContext) -> Result<SessionId> {
        let now = self.clock.now_secs();
        let session = Session {
            context,
            created_at: now,
            expires_at: now.saturating_add(self.ttl_secs),
        };

        loop {
            match self.sessions.entry(SessionId::generate()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(session);
                    return Ok(id);
                }
            }
        }
    }

    async fn get(&self, id: &SessionId) -> Result<Option<UserContext>> {
        let now = self.clock.now_secs();

        if let Some(mut session) = self.sessions.get_mut(id) {
            if session.expires_at > now {
                session.expires_at = session.expires_at.max(now.saturating_add(self.ttl_secs));
                return Ok(Some(session.context.clone()));
            }
        } else {
            return Ok(None);
        }

        self.sessions.remove_if(id, |_, session| session.expires_at <= now);
        Ok(None)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        Ok(self.sessions.remove(id).is_some())
    }

    async fn update(&self, id: &SessionId, context: UserContext) -> Result<bool> {
        let now = self.clock.now_secs();
        match self.sessions.get_mut(id) {
            Some(mut session) if session.expires_at > now => {
                session.context = context;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Identity recovered from a foreign session format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyIdentity {
    /// Subject identifier
    pub subject: String,
    /// Native permissions, mapped with the legacy issuer's table
    pub native_permissions: Vec<String>,
    /// Display attributes
    pub display: DisplayAttributes,
}

/// Decrypts sessions from a previous system when the store has no entry.
#[async_trait]
pub trait LegacySessionFallback: Send + Sync + fmt::Debug {
    /// Recover an identity from `session_id`, or `None` if it is not a valid
    /// legacy session.
    async fn recover(&self, session_id: &str) -> Option<LegacyIdentity>;
}
