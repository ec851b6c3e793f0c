//! Change detection between two tick snapshots.

use crate::entity::Entity;
use crate::tick::EntityStateSnapshot;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Kind of change detected for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    /// The entity appeared.
    Insert,
    /// One or more content fields changed.
    Update,
    /// The entity disappeared.
    Delete,
}

/// One entity's change between two ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    /// The changed entity.
    pub entity_id: EntityId,
    /// What happened to it.
    pub operation: ChangeOperation,
    /// New values of the changed fields. All content fields for inserts,
    /// only the differing ones for updates, empty for deletes.
    pub changes: Map<String, Value>,
}

/// Computes the changes from `before` to `after`, sorted by entity id.
pub fn diff_entities<'a>(
    before: impl IntoIterator<Item = &'a Entity>,
    after: impl IntoIterator<Item = &'a Entity>,
) -> Vec<EntityChange> {
    let before: BTreeMap<EntityId, &Entity> =
        before.into_iter().map(|e| (e.entity_id, e)).collect();
    let after: BTreeMap<EntityId, &Entity> =
        after.into_iter().map(|e| (e.entity_id, e)).collect();

    let mut changes = Vec::new();
    for (id, new) in &after {
        match before.get(id) {
            None => changes.push(EntityChange {
                entity_id: *id,
                operation: ChangeOperation::Insert,
                changes: new.content_fields(),
            }),
            Some(old) => {
                let old_fields = old.content_fields();
                let differing: Map<String, Value> = new
                    .content_fields()
                    .into_iter()
                    .filter(|(key, value)| old_fields.get(key) != Some(value))
                    .collect();
                if !differing.is_empty() {
                    changes.push(EntityChange {
                        entity_id: *id,
                        operation: ChangeOperation::Update,
                        changes: differing,
                    });
                }
            }
        }
    }
    for id in before.keys().filter(|id| !after.contains_key(id)) {
        changes.push(EntityChange {
            entity_id: *id,
            operation: ChangeOperation::Delete,
            changes: Map::new(),
        });
    }

    changes.sort_by_key(|c| c.entity_id);
    changes
}

/// Computes the changes between two snapshot sets.
pub fn diff_snapshots(
    before: &[EntityStateSnapshot],
    after: &[EntityStateSnapshot],
) -> Vec<EntityChange> {
    diff_entities(
        before.iter().map(|s| &s.entity),
        after.iter().map(|s| &s.entity),
    )
}
