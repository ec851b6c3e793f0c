//! Entity records and write payloads.

use crate::types::{AgentId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A live shared object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Stable identifier.
    pub entity_id: EntityId,
    /// Unique name among live entities.
    pub name: String,
    /// Opaque application metadata.
    pub meta_data: Value,
    /// Owning sync group.
    pub sync_group: String,
    /// Client load ordering hint.
    pub load_priority: Option<i32>,
    /// Delete once this long has passed since the last update.
    pub expiry_since_updated_ms: Option<u64>,
    /// Delete once this long has passed since creation.
    pub expiry_since_created_ms: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Creating agent.
    pub created_by: AgentId,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last updating agent.
    pub updated_by: AgentId,
}

impl Entity {
    /// Returns the attributes that take part in change detection, keyed by
    /// their wire names. Audit fields are excluded.
    pub fn content_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(self.name.clone()));
        fields.insert("metaData".into(), self.meta_data.clone());
        fields.insert("syncGroup".into(), Value::String(self.sync_group.clone()));
        fields.insert("loadPriority".into(), self.load_priority.into());
        fields.insert(
            "expirySinceUpdatedMs".into(),
            self.expiry_since_updated_ms.into(),
        );
        fields.insert(
            "expirySinceCreatedMs".into(),
            self.expiry_since_created_ms.into(),
        );
        fields
    }

    /// Returns true if either expiry threshold has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = |since: DateTime<Utc>| (now - since).num_milliseconds();
        let past = |threshold: Option<u64>, since: DateTime<Utc>| {
            threshold.is_some_and(|ms| elapsed_ms(since) >= i64::try_from(ms).unwrap_or(i64::MAX))
        };
        past(self.expiry_since_updated_ms, self.updated_at)
            || past(self.expiry_since_created_ms, self.created_at)
    }
}

/// Payload for creating an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    /// Explicit id. A random one is assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Unique name.
    pub name: String,
    /// Opaque application metadata.
    #[serde(default)]
    pub meta_data: Value,
    /// Owning sync group.
    pub sync_group: String,
    /// Client load ordering hint.
    #[serde(default)]
    pub load_priority: Option<i32>,
    /// Inactivity expiry.
    #[serde(default)]
    pub expiry_since_updated_ms: Option<u64>,
    /// Age expiry.
    #[serde(default)]
    pub expiry_since_created_ms: Option<u64>,
}

impl NewEntity {
    /// Creates a payload with a name and sync group.
    pub fn new(name: impl Into<String>, sync_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync_group: sync_group.into(),
            ..Self::default()
        }
    }

    /// Uses an explicit entity id.
    #[must_use]
    pub fn with_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_meta_data(mut self, meta_data: Value) -> Self {
        self.meta_data = meta_data;
        self
    }

    /// Sets the load priority.
    #[must_use]
    pub fn with_load_priority(mut self, priority: i32) -> Self {
        self.load_priority = Some(priority);
        self
    }

    /// Sets the inactivity expiry.
    #[must_use]
    pub fn with_expiry_since_updated_ms(mut self, ms: u64) -> Self {
        self.expiry_since_updated_ms = Some(ms);
        self
    }

    /// Sets the age expiry.
    #[must_use]
    pub fn with_expiry_since_created_ms(mut self, ms: u64) -> Self {
        self.expiry_since_created_ms = Some(ms);
        self
    }
}

/// Partial update. Absent fields are left untouched; for nullable fields an
/// explicit `null` clears the value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Value>,
    /// Move to another sync group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_group: Option<String>,
    /// New load priority.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub load_priority: Option<Option<i32>>,
    /// New inactivity expiry.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_since_updated_ms: Option<Option<u64>>,
    /// New age expiry.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_since_created_ms: Option<Option<u64>>,
}

impl EntityPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the entity.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn meta_data(mut self, meta_data: Value) -> Self {
        self.meta_data = Some(meta_data);
        self
    }

    /// Moves the entity to another sync group.
    #[must_use]
    pub fn sync_group(mut self, sync_group: impl Into<String>) -> Self {
        self.sync_group = Some(sync_group.into());
        self
    }

    /// Sets or clears the load priority.
    #[must_use]
    pub fn load_priority(mut self, priority: Option<i32>) -> Self {
        self.load_priority = Some(priority);
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.meta_data.is_none()
            && self.sync_group.is_none()
            && self.load_priority.is_none()
            && self.expiry_since_updated_ms.is_none()
            && self.expiry_since_created_ms.is_none()
    }

    pub(crate) fn apply(&self, entity: &mut Entity) {
        if let Some(name) = &self.name {
            entity.name.clone_from(name);
        }
        if let Some(meta_data) = &self.meta_data {
            entity.meta_data = meta_data.clone();
        }
        if let Some(sync_group) = &self.sync_group {
            entity.sync_group.clone_from(sync_group);
        }
        if let Some(priority) = self.load_priority {
            entity.load_priority = priority;
        }
        if let Some(ms) = self.expiry_since_updated_ms {
            entity.expiry_since_updated_ms = ms;
        }
        if let Some(ms) = self.expiry_since_created_ms {
            entity.expiry_since_created_ms = ms;
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entity() -> Entity {
        let now = Utc::now();
        Entity {
            entity_id: EntityId::new(),
            name: "chair".into(),
            meta_data: json!({"color": "red"}),
            sync_group: "NORMAL".into(),
            load_priority: Some(1),
            expiry_since_updated_ms: None,
            expiry_since_created_ms: None,
            created_at: now,
            created_by: AgentId::SYSTEM,
            updated_at: now,
            updated_by: AgentId::SYSTEM,
        }
    }

    #[test]
    fn content_fields_exclude_audit() {
        let fields = entity().content_fields();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields["name"], json!("chair"));
        assert!(!fields.contains_key("updatedAt"));
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: EntityPatch = serde_json::from_str(r#"{"loadPriority":null}"#).unwrap();
        assert_eq!(patch.load_priority, Some(None));

        let patch: EntityPatch = serde_json::from_str(r#"{"name":"B"}"#).unwrap();
        assert_eq!(patch.load_priority, None);
        assert_eq!(patch.name.as_deref(), Some("B"));
    }

    #[test]
    fn patch_apply() {
        let mut e = entity();
        EntityPatch::new()
            .name("table")
            .load_priority(None)
            .apply(&mut e);
        assert_eq!(e.name, "table");
        assert_eq!(e.load_priority, None);
        assert_eq!(e.meta_data, json!({"color": "red"}));
        assert!(EntityPatch::new().is_empty());
    }

    #[test]
    fn expiry_thresholds() {
        let mut e = entity();
        let now = e.updated_at;
        assert!(!e.is_expired(now + Duration::days(365)));

        e.expiry_since_updated_ms = Some(1_000);
        assert!(!e.is_expired(now + Duration::milliseconds(999)));
        assert!(e.is_expired(now + Duration::milliseconds(1_000)));

        e.expiry_since_updated_ms = None;
        e.expiry_since_created_ms = Some(5_000);
        e.updated_at = now + Duration::seconds(10);
        assert!(e.is_expired(now + Duration::seconds(6)));
    }
}
