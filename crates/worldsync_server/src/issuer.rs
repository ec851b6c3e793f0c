//! Session credential issuance.

use crate::auth::{SessionClaims, TokenSigner};
use crate::error::{ServerError, ServerResult};
use crate::session::{Session, SessionStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use worldsync_core::{AgentId, SessionId};

/// A freshly issued credential and its session record.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Bearer token.
    pub token: String,
    /// The stored session.
    pub session: Session,
}

/// Mints signed credentials and stores their session records.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    signer: TokenSigner,
    sessions: Arc<SessionStore>,
    provider: String,
    max_age: Duration,
}

impl CredentialIssuer {
    /// Creates an issuer.
    pub fn new(
        signer: TokenSigner,
        sessions: Arc<SessionStore>,
        provider: impl Into<String>,
        max_age: Duration,
    ) -> Self {
        Self {
            signer,
            sessions,
            provider: provider.into(),
            max_age,
        }
    }

    /// Issues a credential for `agent_id` with the default lifetime.
    pub fn issue(&self, agent_id: AgentId) -> ServerResult<IssuedCredential> {
        self.issue_with_max_age(agent_id, self.max_age)
    }

    /// Issues a credential with an explicit lifetime.
    pub fn issue_with_max_age(
        &self,
        agent_id: AgentId,
        max_age: Duration,
    ) -> ServerResult<IssuedCredential> {
        let issued_at = Utc::now();
        let lifetime = chrono::Duration::from_std(max_age)
            .map_err(|e| ServerError::Config(format!("session max age out of range: {e}")))?;
        let claims = SessionClaims {
            session_id: SessionId::new(),
            agent_id,
            issued_at,
            expires_at: issued_at + lifetime,
        };
        let token = self.signer.sign(&claims)?;
        let session = Session {
            session_id: claims.session_id,
            agent_id,
            provider: self.provider.clone(),
            issued_at,
            expires_at: claims.expires_at,
            token: token.clone(),
            last_seen: issued_at,
            active: true,
        };
        self.sessions.insert(session.clone());
        info!(%agent_id, session_id = %session.session_id, "session issued");
        Ok(IssuedCredential { token, session })
    }
}
