//! Protocol error types.

use thiserror::Error;
use uuid::Uuid;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors decoding an inbound message.
///
/// Both variants keep the `requestId` of the frame when one could be read,
/// so the error reply can be correlated.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not fit its declared type.
    #[error("malformed message: {message}")]
    Malformed {
        /// Request id found in the frame, if any.
        request_id: Option<Uuid>,
        /// What was wrong.
        message: String,
    },

    /// The `type` is not one a client may send.
    #[error("unknown message type: {message_type}")]
    UnknownType {
        /// Request id found in the frame, if any.
        request_id: Option<Uuid>,
        /// The offending type.
        message_type: String,
    },
}

impl ProtocolError {
    /// Creates a malformed message error.
    pub fn malformed(request_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self::Malformed {
            request_id,
            message: message.into(),
        }
    }

    /// Request id of the offending frame.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            ProtocolError::Malformed { request_id, .. }
            | ProtocolError::UnknownType { request_id, .. } => *request_id,
        }
    }
}
