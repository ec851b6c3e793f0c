//! Error types for WorldSync core.

use crate::permission::Action;
use crate::types::EntityId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in WorldSync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The identity lacks the capability for this sync group.
    #[error("{identity} may not {action} in sync group {sync_group}")]
    PermissionDenied {
        /// The caller, rendered for diagnostics.
        identity: String,
        /// The sync group that was accessed.
        sync_group: String,
        /// The refused action.
        action: Action,
    },

    /// The operation is reserved for privileged identities.
    #[error("{identity} is not privileged")]
    PrivilegeRequired {
        /// The caller, rendered for diagnostics.
        identity: String,
    },

    /// No sync group with this name is configured.
    #[error("unknown sync group: {name}")]
    UnknownSyncGroup {
        /// Name of the sync group.
        name: String,
    },

    /// Entity not found.
    #[error("entity not found: {entity_id}")]
    EntityNotFound {
        /// The entity ID that was not found.
        entity_id: EntityId,
    },

    /// No live entity has this name.
    #[error("no entity named {name}")]
    NameNotFound {
        /// The missing name.
        name: String,
    },

    /// Another live entity already uses this name.
    #[error("entity name already in use: {name}")]
    NameConflict {
        /// The conflicting name.
        name: String,
    },

    /// Input failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Another capture holds the sync group's tick lock.
    #[error("tick capture for {sync_group} is busy (waited {waited_ms} ms)")]
    Serialization {
        /// The contended sync group.
        sync_group: String,
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// Tick not found (never captured or already purged).
    #[error("tick {tick_number} not found in sync group {sync_group}")]
    TickNotFound {
        /// The sync group searched.
        sync_group: String,
        /// The tick number that was not found.
        tick_number: u64,
    },

    /// The audit trail collaborator failed.
    #[error("audit trail error: {message}")]
    Audit {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unknown sync group error.
    pub fn unknown_sync_group(name: impl Into<String>) -> Self {
        Self::UnknownSyncGroup { name: name.into() }
    }

    /// Creates an audit trail error.
    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }

    /// Returns true if the caller should retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Serialization { .. })
    }

    /// Returns true if this is an authorization failure.
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            CoreError::PermissionDenied { .. } | CoreError::PrivilegeRequired { .. }
        )
    }

    /// Returns true if the referenced item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::EntityNotFound { .. }
                | CoreError::NameNotFound { .. }
                | CoreError::UnknownSyncGroup { .. }
                | CoreError::TickNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let busy = CoreError::Serialization {
            sync_group: "NORMAL".into(),
            waited_ms: 10,
        };
        assert!(busy.is_retryable());
        assert!(!busy.is_permission_error());

        let denied = CoreError::PermissionDenied {
            identity: "agent:x".into(),
            sync_group: "NORMAL".into(),
            action: Action::Insert,
        };
        assert!(denied.is_permission_error());
        assert!(!denied.is_retryable());

        assert!(CoreError::unknown_sync_group("nope").is_not_found());
    }

    #[test]
    fn error_display() {
        let err = CoreError::PermissionDenied {
            identity: "agent:x".into(),
            sync_group: "NORMAL".into(),
            action: Action::Delete,
        };
        assert_eq!(err.to_string(), "agent:x may not delete in sync group NORMAL");
    }
}
