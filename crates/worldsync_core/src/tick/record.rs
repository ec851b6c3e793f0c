//! Tick and snapshot records.

use crate::entity::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A committed, numbered capture of one sync group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Unique tick id.
    pub tick_id: Uuid,
    /// Owning sync group.
    pub sync_group: String,
    /// Gapless per-group sequence number, starting at 1.
    pub tick_number: u64,
    /// When capture started.
    pub start_time: DateTime<Utc>,
    /// When capture finished.
    pub end_time: DateTime<Utc>,
    /// Capture duration in milliseconds.
    pub duration_ms: i64,
    /// Entities copied into snapshots.
    pub entity_count: u64,
    /// Distinct scripts touched since the previous tick.
    pub script_count: u64,
    /// Distinct assets touched since the previous tick.
    pub asset_count: u64,
    /// Capture took longer than the tick rate.
    pub is_delayed: bool,
    /// Tick rate minus duration. Negative when delayed.
    pub headroom_ms: i64,
    /// Milliseconds between the previous tick's start and this one's.
    pub time_since_last_tick_ms: Option<i64>,
}

/// Copy of one entity as it was when a tick was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStateSnapshot {
    /// Owning tick.
    pub tick_id: Uuid,
    /// Owning tick number.
    pub tick_number: u64,
    /// Entity attributes at capture time.
    pub entity: Entity,
}
