//! The assembled world: entity store, permissions and tick engine.

use crate::audit::{AuditTrail, NoopAuditTrail};
use crate::diff::EntityChange;
use crate::entity::EntityStore;
use crate::error::CoreResult;
use crate::permission::PermissionModel;
use crate::sync_group::{SyncGroup, SyncGroupRegistry};
use crate::tick::{Tick, TickEngine, DEFAULT_CAPTURE_LOCK_TIMEOUT};
use crate::types::{EntityId, Identity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for [`World`].
pub struct WorldBuilder {
    groups: Vec<SyncGroup>,
    audit: Arc<dyn AuditTrail>,
    capture_lock_timeout: Duration,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            audit: Arc::new(NoopAuditTrail),
            capture_lock_timeout: DEFAULT_CAPTURE_LOCK_TIMEOUT,
        }
    }
}

impl WorldBuilder {
    /// Creates a builder with no sync groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sync group.
    #[must_use]
    pub fn sync_group(mut self, group: SyncGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Adds several sync groups.
    #[must_use]
    pub fn sync_groups(mut self, groups: impl IntoIterator<Item = SyncGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Sets the audit trail consulted during capture.
    #[must_use]
    pub fn audit_trail(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets how long a capture waits for its group's lock.
    #[must_use]
    pub fn capture_lock_timeout(mut self, timeout: Duration) -> Self {
        self.capture_lock_timeout = timeout;
        self
    }

    /// Builds the world. Fails on invalid or duplicate sync groups.
    pub fn build(self) -> CoreResult<World> {
        let groups = Arc::new(SyncGroupRegistry::with_groups(self.groups)?);
        let permissions = Arc::new(PermissionModel::new());
        let entities = Arc::new(EntityStore::new(
            Arc::clone(&permissions),
            Arc::clone(&groups),
        ));
        let ticks = TickEngine::new(
            Arc::clone(&groups),
            Arc::clone(&entities),
            self.audit,
            self.capture_lock_timeout,
        );
        info!(sync_groups = groups.len(), "world initialized");
        Ok(World {
            permissions,
            groups,
            entities,
            ticks,
        })
    }
}

/// Shared world state.
///
/// ```rust,ignore
/// let world = World::builder().sync_group(SyncGroup::new("NORMAL", 50, 20)).build()?;
/// world.entities().insert(&Identity::System, NewEntity::new("chair", "NORMAL"))?;
/// world.capture_tick("NORMAL")?;
/// ```
#[derive(Debug)]
pub struct World {
    permissions: Arc<PermissionModel>,
    groups: Arc<SyncGroupRegistry>,
    entities: Arc<EntityStore>,
    ticks: TickEngine,
}

impl World {
    /// Starts building a world.
    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    /// Permission model.
    pub fn permissions(&self) -> &Arc<PermissionModel> {
        &self.permissions
    }

    /// Sync group registry.
    pub fn sync_groups(&self) -> &Arc<SyncGroupRegistry> {
        &self.groups
    }

    /// Entity store.
    pub fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    /// Tick engine.
    pub fn ticks(&self) -> &TickEngine {
        &self.ticks
    }

    /// Captures a tick of one sync group.
    pub fn capture_tick(&self, sync_group: &str) -> CoreResult<Tick> {
        self.ticks.capture_tick(sync_group)
    }

    /// Changes between the last two ticks of one sync group.
    pub fn changes_since_last_tick(&self, sync_group: &str) -> CoreResult<Vec<EntityChange>> {
        self.ticks.changes_since_last_tick(sync_group)
    }

    /// Deletes entities whose expiry elapsed, as the system identity.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<Vec<EntityId>> {
        self.entities.expire(&Identity::System, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NewEntity;

    #[test]
    fn builder_rejects_duplicate_groups() {
        let result = World::builder()
            .sync_group(SyncGroup::new("NORMAL", 50, 20))
            .sync_group(SyncGroup::new("NORMAL", 10, 20))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn sweep_runs_as_system() {
        let world = World::builder()
            .sync_groups(SyncGroup::defaults())
            .build()
            .unwrap();
        let spark = world
            .entities()
            .insert(
                &Identity::System,
                NewEntity::new("spark", "public.NORMAL").with_expiry_since_updated_ms(10),
            )
            .unwrap();
        let removed = world
            .sweep_expired(spark.updated_at + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(removed, vec![spark.entity_id]);
    }
}
