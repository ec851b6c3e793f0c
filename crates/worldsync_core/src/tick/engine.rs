//! Tick capture.

use crate::audit::AuditTrail;
use crate::diff::{diff_snapshots, EntityChange};
use crate::entity::EntityStore;
use crate::error::{CoreError, CoreResult};
use crate::sync_group::SyncGroupRegistry;
use crate::tick::store::StagedTick;
use crate::tick::{EntityStateSnapshot, Tick, TickStore};
use crate::types::Identity;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default bound on waiting for a group's capture lock.
pub const DEFAULT_CAPTURE_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Snapshots sync groups into numbered ticks and diffs them.
///
/// Captures of one group are serialized by a per-group lock; captures of
/// different groups run in parallel.
pub struct TickEngine {
    groups: Arc<SyncGroupRegistry>,
    entities: Arc<EntityStore>,
    audit: Arc<dyn AuditTrail>,
    store: TickStore,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

impl TickEngine {
    /// Creates a tick engine.
    pub fn new(
        groups: Arc<SyncGroupRegistry>,
        entities: Arc<EntityStore>,
        audit: Arc<dyn AuditTrail>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            groups,
            entities,
            audit,
            store: TickStore::new(),
            locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Returns the committed tick history.
    pub fn store(&self) -> &TickStore {
        &self.store
    }

    fn lock_for(&self, sync_group: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(sync_group.to_string())
                .or_default(),
        )
    }

    /// Captures a new tick of `sync_group`.
    ///
    /// Purge, tick row and snapshots are committed together; on any error
    /// nothing is committed and previous ticks are untouched.
    pub fn capture_tick(&self, sync_group: &str) -> CoreResult<Tick> {
        let group = self.groups.get(sync_group)?;

        let lock = self.lock_for(sync_group);
        let waited = Instant::now();
        let _guard = lock
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| CoreError::Serialization {
                sync_group: sync_group.to_string(),
                waited_ms: millis(waited.elapsed()),
            })?;

        let started = Instant::now();
        let start_time = Utc::now();
        let retention = chrono::Duration::milliseconds(clamp_i64(group.retention_ms()));
        let previous = self.store.latest(sync_group);
        let tick_number = self.store.next_number(sync_group);
        let tick_id = Uuid::new_v4();

        let entities = self.entities.list_group(&Identity::System, sync_group)?;
        let snapshots: Vec<EntityStateSnapshot> = entities
            .into_iter()
            .map(|entity| EntityStateSnapshot {
                tick_id,
                tick_number,
                entity,
            })
            .collect();

        let touched = self
            .audit
            .touched_since(sync_group, previous.as_ref().map(|t| t.start_time))?;

        let end_time = Utc::now();
        let duration_ms = clamp_i64(millis(started.elapsed()));
        let rate_ms = clamp_i64(group.tick_rate_ms);
        let tick = Tick {
            tick_id,
            sync_group: sync_group.to_string(),
            tick_number,
            start_time,
            end_time,
            duration_ms,
            entity_count: snapshots.len() as u64,
            script_count: touched.scripts,
            asset_count: touched.assets,
            is_delayed: duration_ms > rate_ms,
            headroom_ms: rate_ms - duration_ms,
            time_since_last_tick_ms: previous
                .as_ref()
                .map(|p| (start_time - p.start_time).num_milliseconds()),
        };

        let purged = self.store.commit(StagedTick {
            purge_before: start_time - retention,
            tick: tick.clone(),
            snapshots,
        })?;

        if tick.is_delayed {
            warn!(
                sync_group,
                tick_number,
                duration_ms,
                rate_ms,
                "tick capture overran its rate"
            );
        }
        debug!(
            sync_group,
            tick_number,
            entities = tick.entity_count,
            purged,
            "tick captured"
        );
        Ok(tick)
    }

    /// Changes between the two most recent ticks of `sync_group`.
    ///
    /// Empty when fewer than two ticks are retained. Callers are
    /// responsible for checking read access to the group.
    pub fn changes_since_last_tick(&self, sync_group: &str) -> CoreResult<Vec<EntityChange>> {
        self.groups.get(sync_group)?;
        Ok(self
            .store
            .latest_pair(sync_group)
            .map(|(before, after)| diff_snapshots(&before, &after))
            .unwrap_or_default())
    }

    /// Changes between two retained ticks.
    pub fn changes_between(
        &self,
        sync_group: &str,
        from_tick: u64,
        to_tick: u64,
    ) -> CoreResult<Vec<EntityChange>> {
        self.groups.get(sync_group)?;
        let (before, after) = self.store.pair(sync_group, from_tick, to_tick)?;
        Ok(diff_snapshots(&before, &after))
    }

    /// Most recent tick of a group.
    pub fn latest_tick(&self, sync_group: &str) -> CoreResult<Option<Tick>> {
        self.groups.get(sync_group)?;
        Ok(self.store.latest(sync_group))
    }

    /// Retained ticks of a group, ascending.
    pub fn ticks(&self, sync_group: &str) -> CoreResult<Vec<Tick>> {
        self.groups.get(sync_group)?;
        Ok(self.store.ticks(sync_group))
    }

    /// Snapshots of one retained tick.
    pub fn snapshots(&self, sync_group: &str, tick_number: u64) -> CoreResult<Vec<EntityStateSnapshot>> {
        self.groups.get(sync_group)?;
        self.store.snapshots(sync_group, tick_number)
    }
}

impl std::fmt::Debug for TickEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickEngine")
            .field("store", &self.store)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
