//! Error types for the world server.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;
use worldsync_core::CoreError;
use worldsync_protocol::{ApiResponse, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the world server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing, malformed, forged, expired or revoked credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A connection dropped or could not be written to.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// World state error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Inbound frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Authentication(_)
            | ServerError::InvalidRequest(_)
            | ServerError::Protocol(_) => true,
            ServerError::Core(err) => !matches!(err, CoreError::Audit { .. }) && !err.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Core(err) => err.is_retryable(),
            ServerError::TransientNetwork(_) => true,
            _ => false,
        }
    }

    /// HTTP status for a REST response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Core(err) if err.is_permission_error() => StatusCode::FORBIDDEN,
            ServerError::Core(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            ServerError::Core(err) if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Core(CoreError::Audit { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Core(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::TransientNetwork(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Config(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::<()>::failure(self.to_string()))).into_response()
    }
}
