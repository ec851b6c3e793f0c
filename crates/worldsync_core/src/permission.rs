//! Per-agent, per-sync-group capability matrix.
//!
//! Every entity read or write is evaluated here before the store is
//! touched. Privilege is decided in exactly one place,
//! [`PermissionModel::is_privileged`]: the [`Identity::System`] identity
//! and agents explicitly flagged through [`PermissionModel::grant_privileged`].

use crate::error::{CoreError, CoreResult};
use crate::types::{AgentId, Identity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// An operation gated by the permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read entities.
    Read,
    /// Create entities.
    Insert,
    /// Modify entities.
    Update,
    /// Remove entities.
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Capabilities of one agent within one sync group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroupRole {
    /// The agent the role applies to.
    pub agent_id: AgentId,
    /// The sync group the role applies to.
    pub sync_group: String,
    /// May read entities.
    #[serde(default)]
    pub can_read: bool,
    /// May create entities.
    #[serde(default)]
    pub can_insert: bool,
    /// May modify entities.
    #[serde(default)]
    pub can_update: bool,
    /// May remove entities.
    #[serde(default)]
    pub can_delete: bool,
}

impl SyncGroupRole {
    /// Creates a role with no capabilities.
    pub fn new(agent_id: AgentId, sync_group: impl Into<String>) -> Self {
        Self {
            agent_id,
            sync_group: sync_group.into(),
            can_read: false,
            can_insert: false,
            can_update: false,
            can_delete: false,
        }
    }

    /// Creates a role with every capability.
    pub fn full(agent_id: AgentId, sync_group: impl Into<String>) -> Self {
        Self::new(agent_id, sync_group)
            .with_read(true)
            .with_insert(true)
            .with_update(true)
            .with_delete(true)
    }

    /// Creates a read-only role.
    pub fn read_only(agent_id: AgentId, sync_group: impl Into<String>) -> Self {
        Self::new(agent_id, sync_group).with_read(true)
    }

    /// Sets the read capability.
    #[must_use]
    pub fn with_read(mut self, value: bool) -> Self {
        self.can_read = value;
        self
    }

    /// Sets the insert capability.
    #[must_use]
    pub fn with_insert(mut self, value: bool) -> Self {
        self.can_insert = value;
        self
    }

    /// Sets the update capability.
    #[must_use]
    pub fn with_update(mut self, value: bool) -> Self {
        self.can_update = value;
        self
    }

    /// Sets the delete capability.
    #[must_use]
    pub fn with_delete(mut self, value: bool) -> Self {
        self.can_delete = value;
        self
    }

    /// Returns true if the role grants `action`.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.can_read,
            Action::Insert => self.can_insert,
            Action::Update => self.can_update,
            Action::Delete => self.can_delete,
        }
    }
}

/// Authorization model consulted on every entity store access.
#[derive(Debug, Default)]
pub struct PermissionModel {
    roles: RwLock<HashMap<(AgentId, String), SyncGroupRole>>,
    privileged: RwLock<HashSet<AgentId>>,
}

impl PermissionModel {
    /// Creates an empty permission model. Only `Identity::System` is privileged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identity bypasses sync group roles.
    pub fn is_privileged(&self, identity: &Identity) -> bool {
        match identity {
            Identity::System => true,
            Identity::Agent(agent) => self.privileged.read().contains(agent),
        }
    }

    /// Returns true if `identity` may perform `action` in `sync_group`.
    pub fn check_permission(&self, identity: &Identity, sync_group: &str, action: Action) -> bool {
        if self.is_privileged(identity) {
            return true;
        }
        let Identity::Agent(agent) = identity else {
            return false;
        };
        self.roles
            .read()
            .get(&(*agent, sync_group.to_string()))
            .is_some_and(|role| role.allows(action))
    }

    /// Like [`check_permission`](Self::check_permission) but returns a typed error.
    pub fn require(&self, identity: &Identity, sync_group: &str, action: Action) -> CoreResult<()> {
        if self.check_permission(identity, sync_group, action) {
            Ok(())
        } else {
            debug!(%identity, sync_group, %action, "permission denied");
            Err(CoreError::PermissionDenied {
                identity: identity.to_string(),
                sync_group: sync_group.to_string(),
                action,
            })
        }
    }

    /// Fails unless the identity is privileged.
    pub fn require_privileged(&self, identity: &Identity) -> CoreResult<()> {
        if self.is_privileged(identity) {
            Ok(())
        } else {
            Err(CoreError::PrivilegeRequired {
                identity: identity.to_string(),
            })
        }
    }

    /// Creates or replaces a role. Only privileged identities may do this.
    pub fn set_role(&self, actor: &Identity, role: SyncGroupRole) -> CoreResult<()> {
        self.require_privileged(actor)?;
        let key = (role.agent_id, role.sync_group.clone());
        self.roles.write().insert(key, role);
        Ok(())
    }

    /// Removes a role. Returns true if one existed.
    pub fn revoke_role(&self, actor: &Identity, agent: AgentId, sync_group: &str) -> CoreResult<bool> {
        self.require_privileged(actor)?;
        Ok(self
            .roles
            .write()
            .remove(&(agent, sync_group.to_string()))
            .is_some())
    }

    /// Returns the role of an agent in a sync group, if any.
    pub fn role(&self, agent: AgentId, sync_group: &str) -> Option<SyncGroupRole> {
        self.roles.read().get(&(agent, sync_group.to_string())).cloned()
    }

    /// Returns every role held by an agent, sorted by sync group.
    pub fn roles_for(&self, agent: AgentId) -> Vec<SyncGroupRole> {
        let mut roles: Vec<_> = self
            .roles
            .read()
            .values()
            .filter(|role| role.agent_id == agent)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.sync_group.cmp(&b.sync_group));
        roles
    }

    /// Flags an agent as privileged.
    pub fn grant_privileged(&self, actor: &Identity, agent: AgentId) -> CoreResult<()> {
        self.require_privileged(actor)?;
        self.privileged.write().insert(agent);
        Ok(())
    }

    /// Removes the privileged flag from an agent. Returns true if it was set.
    pub fn revoke_privileged(&self, actor: &Identity, agent: AgentId) -> CoreResult<bool> {
        self.require_privileged(actor)?;
        Ok(self.privileged.write().remove(&agent))
    }
}
