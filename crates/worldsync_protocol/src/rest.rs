//! REST payloads.

use serde::{Deserialize, Serialize};
use worldsync_core::AgentId;

/// Envelope of every REST response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response with a payload.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl ApiResponse<()> {
    /// Successful response without a payload.
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

/// Payload of `POST /world/rest/session/validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidationData {
    /// Whether the session is valid.
    pub is_valid: bool,
    /// The session's agent.
    pub agent_id: AgentId,
}

/// Payload of `GET /world/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    /// Always `"ok"` while the server accepts requests.
    pub status: String,
    /// Live connections.
    pub connections: usize,
    /// Configured sync groups.
    pub sync_groups: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_payload_shape() {
        let agent = AgentId::new();
        let value = serde_json::to_value(ApiResponse::ok(SessionValidationData {
            is_valid: true,
            agent_id: agent,
        }))
        .unwrap();
        assert_eq!(
            value,
            json!({"success": true, "data": {"isValid": true, "agentId": agent}})
        );
    }

    #[test]
    fn done_and_failure_shapes() {
        assert_eq!(
            serde_json::to_value(ApiResponse::done()).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(ApiResponse::<()>::failure("nope")).unwrap(),
            json!({"success": false, "error": "nope"})
        );
    }
}
