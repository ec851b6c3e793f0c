//! Session credential signing.
//!
//! Credentials are HMAC-SHA256 signed session claims.
//!
//! ## Token Format
//!
//! `base64url(claims_json) "." base64url(signature)`, URL-safe alphabet
//! without padding, so a token is a legal WebSocket subprotocol value.
//! The signature covers the encoded claims segment.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use worldsync_core::{AgentId, SessionId};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Signed contents of a session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Backing session record.
    pub session_id: SessionId,
    /// Agent the session belongs to.
    pub agent_id: AgentId,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Returns true if the claims have expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Signs and verifies session credentials.
#[derive(Clone, Debug)]
pub struct TokenSigner {
    config: AuthConfig,
}

impl TokenSigner {
    /// Creates a new token signer.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a signed token carrying `claims`.
    pub fn sign(&self, claims: &SessionClaims) -> ServerResult<String> {
        let json = serde_json::to_vec(claims)
            .map_err(|e| ServerError::Internal(format!("cannot encode claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Verifies the signature and decodes the claims. Expiry is not checked.
    pub fn decode(&self, token: &str) -> ServerResult<SessionClaims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| ServerError::Authentication("malformed token".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ServerError::Authentication("malformed signature".into()))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::Authentication("invalid signature".into()))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| ServerError::Authentication("malformed claims".into()))?;
        serde_json::from_slice(&json)
            .map_err(|_| ServerError::Authentication("malformed claims".into()))
    }

    /// Verifies the signature and rejects expired claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> ServerResult<SessionClaims> {
        let claims = self.decode(token)?;
        if claims.is_expired(now) {
            return Err(ServerError::Authentication("token expired".into()));
        }
        Ok(claims)
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("invalid HMAC key: {e}")))
    }
}
