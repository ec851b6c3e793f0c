//! Entity query language.

use serde::{Deserialize, Serialize};
use worldsync_core::{Entity, EntityId, EntityPatch, NewEntity};

/// A query against the entity store, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityQuery {
    /// Fetch one entity by id.
    #[serde(rename_all = "camelCase")]
    Get {
        /// Target entity.
        entity_id: EntityId,
    },
    /// Fetch one entity by name.
    GetByName {
        /// Entity name.
        name: String,
    },
    /// List every entity of a sync group.
    #[serde(rename_all = "camelCase")]
    List {
        /// Sync group to list.
        sync_group: String,
    },
    /// Create an entity.
    Insert {
        /// Creation payload.
        entity: NewEntity,
    },
    /// Apply a partial update.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Target entity.
        entity_id: EntityId,
        /// Fields to change.
        patch: EntityPatch,
    },
    /// Delete an entity.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// Target entity.
        entity_id: EntityId,
    },
}

impl EntityQuery {
    /// Returns true if the query writes.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            EntityQuery::Insert { .. } | EntityQuery::Update { .. } | EntityQuery::Delete { .. }
        )
    }
}

/// Result of an [`EntityQuery`], tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResult {
    /// A single entity.
    Entity {
        /// The entity.
        entity: Entity,
    },
    /// Several entities, ordered by id.
    Entities {
        /// The entities.
        entities: Vec<Entity>,
    },
    /// An entity was deleted.
    #[serde(rename_all = "camelCase")]
    Deleted {
        /// The deleted entity.
        entity_id: EntityId,
    },
}
