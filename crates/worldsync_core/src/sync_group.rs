//! Sync group configuration.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A named partition of entities sharing one tick rate and retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroup {
    /// Unique name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target interval between ticks, in milliseconds.
    pub tick_rate_ms: u64,
    /// Number of ticks kept before history is purged.
    pub max_ticks_buffer: u32,
}

impl SyncGroup {
    /// Creates a sync group.
    pub fn new(name: impl Into<String>, tick_rate_ms: u64, max_ticks_buffer: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            tick_rate_ms,
            max_ticks_buffer,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The stock groups a fresh world starts with.
    pub fn defaults() -> Vec<SyncGroup> {
        vec![
            SyncGroup::new("public.REALTIME", 16, 50).with_description("Avatars and physics"),
            SyncGroup::new("public.NORMAL", 50, 20).with_description("Interactive objects"),
            SyncGroup::new("public.BACKGROUND", 200, 10).with_description("Ambient state"),
            SyncGroup::new("public.STATIC", 2000, 5).with_description("Rarely changing scenery"),
        ]
    }

    /// Target tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }

    /// How long ticks are retained: rate × buffer.
    pub fn retention_ms(&self) -> u64 {
        self.tick_rate_ms
            .saturating_mul(u64::from(self.max_ticks_buffer))
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("sync group name cannot be empty"));
        }
        if self.tick_rate_ms == 0 {
            return Err(CoreError::validation(format!(
                "sync group {} must have a positive tick rate",
                self.name
            )));
        }
        if self.max_ticks_buffer == 0 {
            return Err(CoreError::validation(format!(
                "sync group {} must buffer at least one tick",
                self.name
            )));
        }
        Ok(())
    }
}

/// The set of configured sync groups.
#[derive(Debug, Default)]
pub struct SyncGroupRegistry {
    groups: RwLock<BTreeMap<String, SyncGroup>>,
}

impl SyncGroupRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a list of groups.
    pub fn with_groups(groups: impl IntoIterator<Item = SyncGroup>) -> CoreResult<Self> {
        let registry = Self::new();
        for group in groups {
            registry.register(group)?;
        }
        Ok(registry)
    }

    /// Registers a new group. Groups are immutable once registered.
    pub fn register(&self, group: SyncGroup) -> CoreResult<()> {
        group.validate()?;
        let mut groups = self.groups.write();
        if groups.contains_key(&group.name) {
            return Err(CoreError::validation(format!(
                "sync group {} is already registered",
                group.name
            )));
        }
        groups.insert(group.name.clone(), group);
        Ok(())
    }

    /// Looks up a group by name.
    pub fn get(&self, name: &str) -> CoreResult<SyncGroup> {
        self.groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_sync_group(name))
    }

    /// Returns true if a group with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.groups.read().contains_key(name)
    }

    /// Returns all groups sorted by name.
    pub fn all(&self) -> Vec<SyncGroup> {
        self.groups.read().values().cloned().collect()
    }

    /// Returns the number of groups.
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Returns true if no group is registered.
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}
