//! Message envelope for the persistent connection.
//!
//! Every frame is a JSON object discriminated by `type`, with camelCase
//! fields. Requests may carry a `requestId` which the reply echoes.
//!
//! A `requestId` must be a UUID string. Any other value makes the whole
//! frame malformed, and the error reply names the rejected value since it
//! cannot echo it back.

use crate::error::{ProtocolError, ProtocolResult};
use crate::query::{EntityQuery, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use worldsync_core::{AgentId, CoreError, EntityChange, SessionId};

/// Message types a client may send.
pub const CLIENT_MESSAGE_TYPES: [&str; 4] = [
    "HEARTBEAT",
    "CONFIG_REQUEST",
    "QUERY_REQUEST",
    "SYNC_GROUP_UPDATES_REQUEST",
];

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Liveness ping.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },
    /// Ask for the runtime configuration.
    #[serde(rename_all = "camelCase")]
    ConfigRequest {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },
    /// Run an entity query.
    #[serde(rename_all = "camelCase")]
    QueryRequest {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// The query.
        query: EntityQuery,
    },
    /// Ask for the changes between the last two ticks of a group.
    #[serde(rename_all = "camelCase")]
    SyncGroupUpdatesRequest {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// Target sync group.
        sync_group: String,
    },
}

impl ClientMessage {
    /// Returns the wire type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Heartbeat { .. } => "HEARTBEAT",
            ClientMessage::ConfigRequest { .. } => "CONFIG_REQUEST",
            ClientMessage::QueryRequest { .. } => "QUERY_REQUEST",
            ClientMessage::SyncGroupUpdatesRequest { .. } => "SYNC_GROUP_UPDATES_REQUEST",
        }
    }

    /// Returns the correlation id.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            ClientMessage::Heartbeat { request_id }
            | ClientMessage::ConfigRequest { request_id }
            | ClientMessage::QueryRequest { request_id, .. }
            | ClientMessage::SyncGroupUpdatesRequest { request_id, .. } => *request_id,
        }
    }
}

/// Heartbeat timing advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatSettings {
    /// How often clients should send a heartbeat.
    pub interval_ms: u64,
    /// Silence after which the server closes the connection.
    pub timeout_ms: u64,
}

/// Session lifetime advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Maximum session age.
    pub max_age_ms: u64,
    /// Interval of the server-side session sweep.
    pub cleanup_interval_ms: u64,
}

/// Runtime configuration returned by `CONFIG_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Heartbeat timing.
    pub heartbeat: HeartbeatSettings,
    /// Session lifetime.
    pub session: SessionSettings,
}

/// Category of an `ERROR` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The identity lacks the required capability.
    Permission,
    /// The request was understood but invalid.
    Validation,
    /// The referenced entity, group or tick does not exist.
    NotFound,
    /// The frame's `type` is not a client message.
    UnknownType,
    /// The frame could not be decoded.
    Malformed,
    /// The server was busy; retrying may succeed.
    Unavailable,
    /// Unexpected server failure.
    Internal,
}

impl From<&CoreError> for ErrorKind {
    fn from(err: &CoreError) -> Self {
        if err.is_permission_error() {
            ErrorKind::Permission
        } else if err.is_not_found() {
            ErrorKind::NotFound
        } else if err.is_retryable() {
            ErrorKind::Unavailable
        } else if matches!(err, CoreError::Audit { .. }) {
            ErrorKind::Internal
        } else {
            ErrorKind::Validation
        }
    }
}

impl From<&ProtocolError> for ErrorKind {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed { .. } => ErrorKind::Malformed,
            ProtocolError::UnknownType { .. } => ErrorKind::UnknownType,
        }
    }
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// First frame after a successful upgrade.
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        /// Authenticated agent.
        agent_id: AgentId,
        /// Backing session.
        session_id: SessionId,
    },
    /// Reply to `HEARTBEAT`.
    #[serde(rename_all = "camelCase")]
    HeartbeatAck {
        /// Echoed correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },
    /// Reply to `CONFIG_REQUEST`.
    #[serde(rename_all = "camelCase")]
    ConfigResponse {
        /// Echoed correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// Runtime configuration.
        config: RuntimeConfig,
    },
    /// Reply to `QUERY_REQUEST`.
    #[serde(rename_all = "camelCase")]
    QueryResponse {
        /// Echoed correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// Query outcome.
        result: QueryResult,
    },
    /// Reply to `SYNC_GROUP_UPDATES_REQUEST`.
    #[serde(rename_all = "camelCase")]
    SyncGroupUpdatesResponse {
        /// Echoed correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// The requested sync group.
        sync_group: String,
        /// Changes between its last two ticks.
        changes: Vec<EntityChange>,
    },
    /// A request failed. The connection stays open.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Echoed correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        /// Failure category.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerMessage {
    /// Creates an error reply.
    pub fn error(request_id: Option<Uuid>, kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id,
            kind,
            message: message.into(),
        }
    }

    /// Creates an error reply from a core error.
    pub fn from_core_error(request_id: Option<Uuid>, err: &CoreError) -> Self {
        Self::error(request_id, ErrorKind::from(err), err.to_string())
    }

    /// Creates an error reply from a decode failure.
    pub fn from_protocol_error(err: &ProtocolError) -> Self {
        Self::error(err.request_id(), ErrorKind::from(err), err.to_string())
    }

    /// Returns the wire type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionEstablished { .. } => "CONNECTION_ESTABLISHED",
            ServerMessage::HeartbeatAck { .. } => "HEARTBEAT_ACK",
            ServerMessage::ConfigResponse { .. } => "CONFIG_RESPONSE",
            ServerMessage::QueryResponse { .. } => "QUERY_RESPONSE",
            ServerMessage::SyncGroupUpdatesResponse { .. } => "SYNC_GROUP_UPDATES_RESPONSE",
            ServerMessage::Error { .. } => "ERROR",
        }
    }

    /// Serializes to a JSON text frame.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::malformed(None, e.to_string()))
    }
}

/// Decodes an inbound text frame.
///
/// An unrecognized `type` yields [`ProtocolError::UnknownType`]; anything
/// else that fails to decode yields [`ProtocolError::Malformed`].
pub fn parse_client_message(text: &str) -> ProtocolResult<ClientMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::malformed(None, e.to_string()))?;
    let request_id = match value.get("requestId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(Uuid::parse_str(s).map_err(|_| {
            ProtocolError::malformed(None, format!("requestId {s:?} is not a UUID"))
        })?),
        Some(other) => {
            return Err(ProtocolError::malformed(
                None,
                format!("requestId must be a UUID string, got {other}"),
            ))
        }
    };
    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::malformed(request_id, "missing string field `type`"))?;

    if !CLIENT_MESSAGE_TYPES.contains(&message_type) {
        return Err(ProtocolError::UnknownType {
            request_id,
            message_type: message_type.to_string(),
        });
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::malformed(request_id, e.to_string()))
}
