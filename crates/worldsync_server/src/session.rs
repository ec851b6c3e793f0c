//! Persisted session records.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use worldsync_core::{AgentId, SessionId};

/// A session backing a signed credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id.
    pub session_id: SessionId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Auth provider that issued the session.
    pub provider: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// The signed credential.
    pub token: String,
    /// Last inbound activity.
    pub last_seen: DateTime<Utc>,
    /// Cleared on logout or expiry. Never set again.
    pub active: bool,
}

impl Session {
    /// Returns true if the session is active and unexpired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }
}

/// Table of session records.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new session.
    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.session_id, session);
    }

    /// Looks up a session.
    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// Advances `last_seen` of an active session. Returns false if the
    /// session is unknown or inactive.
    pub fn touch(&self, session_id: SessionId, now: DateTime<Utc>) -> bool {
        match self.sessions.write().get_mut(&session_id) {
            Some(session) if session.active => {
                if now > session.last_seen {
                    session.last_seen = now;
                }
                true
            }
            _ => false,
        }
    }

    /// Deactivates a session. Returns true if this call deactivated it.
    pub fn invalidate(&self, session_id: SessionId) -> bool {
        match self.sessions.write().get_mut(&session_id) {
            Some(session) if session.active => {
                session.active = false;
                true
            }
            _ => false,
        }
    }

    /// Deactivates every session expired at `now`. Returns their ids.
    pub fn invalidate_expired(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut sessions = self.sessions.write();
        sessions
            .values_mut()
            .filter(|s| s.active && now >= s.expires_at)
            .map(|s| {
                s.active = false;
                s.session_id
            })
            .collect()
    }

    /// Drops inactive records. Returns how many were dropped.
    pub fn purge_inactive(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.active);
        before - sessions.len()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Number of active records.
    pub fn active_count(&self) -> usize {
        self.sessions.read().values().filter(|s| s.active).count()
    }
}
