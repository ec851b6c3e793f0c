//! Entity store for CRUD operations.

use crate::entity::{Entity, EntityPatch, NewEntity};
use crate::error::{CoreError, CoreResult};
use crate::permission::{Action, PermissionModel};
use crate::sync_group::SyncGroupRegistry;
use crate::types::{EntityId, Identity};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct StoreState {
    entities: HashMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
}

/// Table of live entities.
///
/// Every method takes the calling [`Identity`] and evaluates the
/// [`PermissionModel`] before reading or writing. There is no unchecked
/// accessor; internal components use [`Identity::System`].
pub struct EntityStore {
    permissions: Arc<PermissionModel>,
    groups: Arc<SyncGroupRegistry>,
    state: RwLock<StoreState>,
}

impl EntityStore {
    /// Creates an empty entity store.
    pub fn new(permissions: Arc<PermissionModel>, groups: Arc<SyncGroupRegistry>) -> Self {
        Self {
            permissions,
            groups,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Gets an entity by ID.
    ///
    /// An entity in a group the caller cannot read is reported as
    /// [`CoreError::EntityNotFound`], the same as a missing id.
    pub fn get(&self, identity: &Identity, entity_id: EntityId) -> CoreResult<Entity> {
        self.readable(identity, |state| state.entities.get(&entity_id))
            .ok_or(CoreError::EntityNotFound { entity_id })
    }

    /// Gets an entity by its unique name.
    ///
    /// Unreadable entities are reported as [`CoreError::NameNotFound`].
    pub fn get_by_name(&self, identity: &Identity, name: &str) -> CoreResult<Entity> {
        self.readable(identity, |state| {
            state.names.get(name).and_then(|id| state.entities.get(id))
        })
        .ok_or_else(|| CoreError::NameNotFound {
            name: name.to_string(),
        })
    }

    fn readable<F>(&self, identity: &Identity, lookup: F) -> Option<Entity>
    where
        F: for<'a> FnOnce(&'a StoreState) -> Option<&'a Entity>,
    {
        let state = self.state.read();
        lookup(&*state)
            .filter(|entity| {
                self.permissions
                    .check_permission(identity, &entity.sync_group, Action::Read)
            })
            .cloned()
    }

    /// Returns every entity of a sync group, ordered by entity id.
    ///
    /// The listing is taken under one read lock, so it is a consistent
    /// view of the group.
    pub fn list_group(&self, identity: &Identity, sync_group: &str) -> CoreResult<Vec<Entity>> {
        if !self.groups.contains(sync_group) {
            return Err(CoreError::unknown_sync_group(sync_group));
        }
        self.permissions
            .require(identity, sync_group, Action::Read)?;

        let state = self.state.read();
        let mut entities: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.sync_group == sync_group)
            .cloned()
            .collect();
        entities.sort_by_key(|e| e.entity_id);
        Ok(entities)
    }

    /// Returns the number of entities in a sync group.
    pub fn count(&self, identity: &Identity, sync_group: &str) -> CoreResult<usize> {
        self.permissions
            .require(identity, sync_group, Action::Read)?;
        Ok(self
            .state
            .read()
            .entities
            .values()
            .filter(|e| e.sync_group == sync_group)
            .count())
    }

    /// Creates an entity.
    pub fn insert(&self, identity: &Identity, new: NewEntity) -> CoreResult<Entity> {
        validate_name(&new.name)?;
        if !self.groups.contains(&new.sync_group) {
            return Err(CoreError::unknown_sync_group(&new.sync_group));
        }
        self.permissions
            .require(identity, &new.sync_group, Action::Insert)?;

        let mut state = self.state.write();
        if state.names.contains_key(&new.name) {
            return Err(CoreError::NameConflict { name: new.name });
        }
        let entity_id = new.entity_id.unwrap_or_default();
        if state.entities.contains_key(&entity_id) {
            return Err(CoreError::validation(format!(
                "entity {entity_id} already exists"
            )));
        }

        let now = Utc::now();
        let entity = Entity {
            entity_id,
            name: new.name,
            meta_data: new.meta_data,
            sync_group: new.sync_group,
            load_priority: new.load_priority,
            expiry_since_updated_ms: new.expiry_since_updated_ms,
            expiry_since_created_ms: new.expiry_since_created_ms,
            created_at: now,
            created_by: identity.audit_id(),
            updated_at: now,
            updated_by: identity.audit_id(),
        };
        state.names.insert(entity.name.clone(), entity_id);
        state.entities.insert(entity_id, entity.clone());
        debug!(%entity_id, name = %entity.name, sync_group = %entity.sync_group, "entity inserted");
        Ok(entity)
    }

    /// Applies a partial update.
    ///
    /// Moving an entity to another sync group needs update rights in the
    /// source group and insert rights in the target group.
    pub fn update(
        &self,
        identity: &Identity,
        entity_id: EntityId,
        patch: EntityPatch,
    ) -> CoreResult<Entity> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        let mut state = self.state.write();
        let current = state
            .entities
            .get(&entity_id)
            .ok_or(CoreError::EntityNotFound { entity_id })?;
        self.permissions
            .require(identity, &current.sync_group, Action::Update)?;

        if let Some(target) = &patch.sync_group {
            if target != &current.sync_group {
                if !self.groups.contains(target) {
                    return Err(CoreError::unknown_sync_group(target));
                }
                self.permissions.require(identity, target, Action::Insert)?;
            }
        }
        if let Some(name) = &patch.name {
            if state.names.get(name).is_some_and(|owner| *owner != entity_id) {
                return Err(CoreError::NameConflict { name: name.clone() });
            }
        }

        let mut updated = current.clone();
        patch.apply(&mut updated);
        updated.updated_at = Utc::now();
        updated.updated_by = identity.audit_id();

        let old_name = current.name.clone();
        if old_name != updated.name {
            state.names.remove(&old_name);
            state.names.insert(updated.name.clone(), entity_id);
        }
        state.entities.insert(entity_id, updated.clone());
        debug!(%entity_id, "entity updated");
        Ok(updated)
    }

    /// Deletes an entity and returns its last state.
    pub fn delete(&self, identity: &Identity, entity_id: EntityId) -> CoreResult<Entity> {
        let mut state = self.state.write();
        let sync_group = state
            .entities
            .get(&entity_id)
            .map(|e| e.sync_group.clone())
            .ok_or(CoreError::EntityNotFound { entity_id })?;
        self.permissions
            .require(identity, &sync_group, Action::Delete)?;

        let removed = state
            .entities
            .remove(&entity_id)
            .ok_or(CoreError::EntityNotFound { entity_id })?;
        state.names.remove(&removed.name);
        debug!(%entity_id, "entity deleted");
        Ok(removed)
    }

    /// Deletes every entity whose expiry threshold has elapsed at `now`.
    ///
    /// Only privileged identities may sweep. Returns the deleted ids.
    pub fn expire(&self, identity: &Identity, now: DateTime<Utc>) -> CoreResult<Vec<EntityId>> {
        self.permissions.require_privileged(identity)?;

        let mut state = self.state.write();
        let mut expired: Vec<EntityId> = state
            .entities
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.entity_id)
            .collect();
        expired.sort();
        for entity_id in &expired {
            if let Some(entity) = state.entities.remove(entity_id) {
                state.names.remove(&entity.name);
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired entities removed");
        }
        Ok(expired)
    }

    /// Returns the total number of entities across all sync groups.
    pub fn total_count(&self) -> usize {
        self.state.read().entities.len()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("total_count", &self.total_count())
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("entity name cannot be empty"));
    }
    if name.len() > 255 {
        return Err(CoreError::validation(
            "entity name too long (max 255 bytes)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::SyncGroupRole;
    use crate::sync_group::SyncGroup;
    use crate::types::AgentId;
    use chrono::Duration;
    use serde_json::json;

    fn create_store() -> (EntityStore, Arc<PermissionModel>) {
        let permissions = Arc::new(PermissionModel::new());
        let groups = Arc::new(
            SyncGroupRegistry::with_groups([
                SyncGroup::new("NORMAL", 50, 10),
                SyncGroup::new("STATIC", 2000, 5),
            ])
            .unwrap(),
        );
        (EntityStore::new(Arc::clone(&permissions), groups), permissions)
    }

    #[test]
    fn insert_and_get() {
        let (store, _) = create_store();
        let entity = store
            .insert(
                &Identity::System,
                NewEntity::new("chair", "NORMAL").with_meta_data(json!({"legs": 4})),
            )
            .unwrap();

        let fetched = store.get(&Identity::System, entity.entity_id).unwrap();
        assert_eq!(fetched, entity);
        assert_eq!(fetched.created_by, AgentId::SYSTEM);

        let by_name = store.get_by_name(&Identity::System, "chair").unwrap();
        assert_eq!(by_name.entity_id, entity.entity_id);
    }

    #[test]
    fn names_are_unique() {
        let (store, _) = create_store();
        store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL"))
            .unwrap();
        let err = store
            .insert(&Identity::System, NewEntity::new("chair", "STATIC"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NameConflict { .. }));
    }

    #[test]
    fn unknown_group_rejected() {
        let (store, _) = create_store();
        let err = store
            .insert(&Identity::System, NewEntity::new("chair", "MISSING"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn agent_needs_roles() {
        let (store, permissions) = create_store();
        let agent = AgentId::new();
        let identity = Identity::Agent(agent);

        let err = store
            .insert(&identity, NewEntity::new("chair", "NORMAL"))
            .unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(store.total_count(), 0);

        permissions
            .set_role(
                &Identity::System,
                SyncGroupRole::new(agent, "NORMAL").with_insert(true),
            )
            .unwrap();
        let chair = store
            .insert(&identity, NewEntity::new("chair", "NORMAL"))
            .unwrap();
        assert_eq!(chair.created_by, agent);

        // Insert alone does not grant read.
        assert!(store.get(&identity, chair.entity_id).unwrap_err().is_not_found());
        assert!(store.list_group(&identity, "NORMAL").unwrap_err().is_permission_error());
    }

    #[test]
    fn rename_keeps_id() {
        let (store, _) = create_store();
        let a = store
            .insert(&Identity::System, NewEntity::new("A", "NORMAL"))
            .unwrap();
        let b = store
            .update(&Identity::System, a.entity_id, EntityPatch::new().name("B"))
            .unwrap();

        assert_eq!(a.entity_id, b.entity_id);
        assert!(b.updated_at >= a.updated_at);
        assert!(store.get_by_name(&Identity::System, "A").is_err());
        assert_eq!(store.get_by_name(&Identity::System, "B").unwrap().entity_id, a.entity_id);
    }

    #[test]
    fn moving_groups_needs_insert_on_target() {
        let (store, permissions) = create_store();
        let agent = AgentId::new();
        permissions
            .set_role(&Identity::System, SyncGroupRole::full(agent, "NORMAL"))
            .unwrap();
        let identity = Identity::Agent(agent);
        let chair = store
            .insert(&identity, NewEntity::new("chair", "NORMAL"))
            .unwrap();

        let err = store
            .update(&identity, chair.entity_id, EntityPatch::new().sync_group("STATIC"))
            .unwrap_err();
        assert!(err.is_permission_error());

        permissions
            .set_role(
                &Identity::System,
                SyncGroupRole::new(agent, "STATIC").with_insert(true),
            )
            .unwrap();
        let moved = store
            .update(&identity, chair.entity_id, EntityPatch::new().sync_group("STATIC"))
            .unwrap();
        assert_eq!(moved.sync_group, "STATIC");
    }

    #[test]
    fn delete_frees_name() {
        let (store, _) = create_store();
        let chair = store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL"))
            .unwrap();
        store.delete(&Identity::System, chair.entity_id).unwrap();

        assert!(matches!(
            store.get(&Identity::System, chair.entity_id),
            Err(CoreError::EntityNotFound { .. })
        ));
        store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL"))
            .unwrap();
    }

    #[test]
    fn list_group_is_scoped_and_sorted() {
        let (store, _) = create_store();
        for name in ["a", "b", "c"] {
            store
                .insert(&Identity::System, NewEntity::new(name, "NORMAL"))
                .unwrap();
        }
        store
            .insert(&Identity::System, NewEntity::new("rock", "STATIC"))
            .unwrap();

        let normal = store.list_group(&Identity::System, "NORMAL").unwrap();
        assert_eq!(normal.len(), 3);
        assert!(normal.windows(2).all(|w| w[0].entity_id < w[1].entity_id));
        assert_eq!(store.count(&Identity::System, "STATIC").unwrap(), 1);
    }

    #[test]
    fn expire_requires_privilege() {
        let (store, _) = create_store();
        let temp = store
            .insert(
                &Identity::System,
                NewEntity::new("spark", "NORMAL").with_expiry_since_created_ms(100),
            )
            .unwrap();
        store
            .insert(&Identity::System, NewEntity::new("rock", "NORMAL"))
            .unwrap();

        let agent = Identity::Agent(AgentId::new());
        assert!(store.expire(&agent, Utc::now()).unwrap_err().is_permission_error());

        let expired = store
            .expire(&Identity::System, temp.created_at + Duration::seconds(1))
            .unwrap();
        assert_eq!(expired, vec![temp.entity_id]);
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn unreadable_entities_look_missing() {
        let (store, permissions) = create_store();
        let chair = store
            .insert(&Identity::System, NewEntity::new("chair", "STATIC"))
            .unwrap();
        let agent = AgentId::new();
        let identity = Identity::Agent(agent);

        let hidden = store.get(&identity, chair.entity_id).unwrap_err();
        let missing = store.get(&identity, EntityId::new()).unwrap_err();
        assert!(hidden.is_not_found());
        assert_eq!(
            std::mem::discriminant(&hidden),
            std::mem::discriminant(&missing)
        );

        let hidden = store.get_by_name(&identity, "chair").unwrap_err();
        let missing = store.get_by_name(&identity, "table").unwrap_err();
        assert!(matches!(hidden, CoreError::NameNotFound { .. }));
        assert!(matches!(missing, CoreError::NameNotFound { .. }));

        permissions
            .set_role(&Identity::System, SyncGroupRole::read_only(agent, "STATIC"))
            .unwrap();
        assert_eq!(store.get(&identity, chair.entity_id).unwrap().name, "chair");
        assert_eq!(store.get_by_name(&identity, "chair").unwrap().entity_id, chair.entity_id);
    }
}
