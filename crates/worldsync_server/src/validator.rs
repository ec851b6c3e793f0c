//! Credential validation against signature and session record.

use crate::auth::TokenSigner;
use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use worldsync_core::{AgentId, SessionId};

/// Outcome of validating a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    /// The authenticated agent. `None` when invalid.
    pub agent_id: Option<AgentId>,
    /// The backing session. `None` when invalid.
    pub session_id: Option<SessionId>,
    /// Whether the credential is currently valid.
    pub is_valid: bool,
}

impl Validation {
    /// A failed validation.
    pub const INVALID: Validation = Validation {
        agent_id: None,
        session_id: None,
        is_valid: false,
    };

    /// Both identifiers of a valid result.
    pub fn identity(&self) -> Option<(AgentId, SessionId)> {
        match (self.is_valid, self.agent_id, self.session_id) {
            (true, Some(agent), Some(session)) => Some((agent, session)),
            _ => None,
        }
    }
}

/// Validates bearer credentials.
///
/// A credential is valid when its signature verifies, its claims are
/// unexpired, and its session record exists, is active and unexpired,
/// belongs to the same agent and holds the same credential.
#[derive(Debug, Clone)]
pub struct SessionValidator {
    signer: TokenSigner,
    sessions: Arc<SessionStore>,
}

impl SessionValidator {
    /// Creates a validator.
    pub fn new(signer: TokenSigner, sessions: Arc<SessionStore>) -> Self {
        Self { signer, sessions }
    }

    /// Validates a credential now.
    pub fn validate(&self, token: &str) -> Validation {
        self.validate_at(token, Utc::now())
    }

    /// Validates a credential at `now`. Never fails; every problem folds
    /// into [`Validation::INVALID`].
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Validation {
        let claims = match self.signer.verify(token, now) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "credential rejected");
                return Validation::INVALID;
            }
        };
        let Some(session) = self.sessions.get(claims.session_id) else {
            debug!(session_id = %claims.session_id, "no session record");
            return Validation::INVALID;
        };
        if !session.is_usable(now) {
            debug!(session_id = %claims.session_id, "session inactive or expired");
            return Validation::INVALID;
        }
        if session.agent_id != claims.agent_id || session.token != token {
            debug!(session_id = %claims.session_id, "credential does not match session");
            return Validation::INVALID;
        }
        Validation {
            agent_id: Some(claims.agent_id),
            session_id: Some(claims.session_id),
            is_valid: true,
        }
    }

    /// The signer used to verify credentials.
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// The session records consulted.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}
