//! Committed tick history.

use crate::error::{CoreError, CoreResult};
use crate::tick::{EntityStateSnapshot, Tick};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// A tick that has been fully prepared but not yet made visible.
///
/// Nothing in a staged tick is observable until [`TickStore::commit`]
/// succeeds. Dropping it discards the work.
#[derive(Debug)]
pub(crate) struct StagedTick {
    /// Ticks starting before this instant are purged on commit.
    pub purge_before: DateTime<Utc>,
    pub tick: Tick,
    pub snapshots: Vec<EntityStateSnapshot>,
}

#[derive(Debug, Default)]
struct GroupTicks {
    /// High-water mark. Survives purges.
    last_number: u64,
    ticks: BTreeMap<u64, Tick>,
    snapshots: HashMap<u64, Vec<EntityStateSnapshot>>,
}

impl GroupTicks {
    fn latest_two(&self) -> Option<(u64, u64)> {
        let mut numbers = self.ticks.keys().rev();
        let to = *numbers.next()?;
        let from = *numbers.next()?;
        Some((from, to))
    }

    fn snapshots_of(&self, sync_group: &str, tick_number: u64) -> CoreResult<&[EntityStateSnapshot]> {
        self.snapshots
            .get(&tick_number)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::TickNotFound {
                sync_group: sync_group.to_string(),
                tick_number,
            })
    }
}

/// Per-group tick and snapshot tables.
#[derive(Debug, Default)]
pub struct TickStore {
    groups: RwLock<HashMap<String, GroupTicks>>,
}

/// Snapshot sets of two ticks read under one lock.
pub(crate) type SnapshotPair = (Vec<EntityStateSnapshot>, Vec<EntityStateSnapshot>);

impl TickStore {
    /// Creates an empty tick store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number the next tick of this group will receive.
    pub fn next_number(&self, sync_group: &str) -> u64 {
        self.groups
            .read()
            .get(sync_group)
            .map_or(0, |g| g.last_number)
            + 1
    }

    /// Commits a staged tick together with its purge.
    ///
    /// Returns the number of purged ticks. The staged tick number must be
    /// exactly one past the group's high-water mark.
    pub(crate) fn commit(&self, staged: StagedTick) -> CoreResult<usize> {
        let mut groups = self.groups.write();
        let group = groups.entry(staged.tick.sync_group.clone()).or_default();

        let number = staged.tick.tick_number;
        if number != group.last_number + 1 {
            return Err(CoreError::validation(format!(
                "tick {number} does not follow {} in {}",
                group.last_number, staged.tick.sync_group
            )));
        }

        let stale: Vec<u64> = group
            .ticks
            .values()
            .filter(|t| t.start_time < staged.purge_before)
            .map(|t| t.tick_number)
            .collect();
        for n in &stale {
            group.ticks.remove(n);
            group.snapshots.remove(n);
        }

        group.last_number = number;
        group.ticks.insert(number, staged.tick);
        group.snapshots.insert(number, staged.snapshots);
        Ok(stale.len())
    }

    /// Returns the most recent committed tick.
    pub fn latest(&self, sync_group: &str) -> Option<Tick> {
        self.groups
            .read()
            .get(sync_group)
            .and_then(|g| g.ticks.values().next_back().cloned())
    }

    /// Returns retained ticks in ascending order.
    pub fn ticks(&self, sync_group: &str) -> Vec<Tick> {
        self.groups
            .read()
            .get(sync_group)
            .map(|g| g.ticks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns one retained tick.
    pub fn tick(&self, sync_group: &str, tick_number: u64) -> CoreResult<Tick> {
        self.groups
            .read()
            .get(sync_group)
            .and_then(|g| g.ticks.get(&tick_number).cloned())
            .ok_or_else(|| CoreError::TickNotFound {
                sync_group: sync_group.to_string(),
                tick_number,
            })
    }

    /// Returns the snapshots of one retained tick.
    pub fn snapshots(&self, sync_group: &str, tick_number: u64) -> CoreResult<Vec<EntityStateSnapshot>> {
        let groups = self.groups.read();
        match groups.get(sync_group) {
            Some(group) => group.snapshots_of(sync_group, tick_number).map(<[_]>::to_vec),
            None => Err(CoreError::TickNotFound {
                sync_group: sync_group.to_string(),
                tick_number,
            }),
        }
    }

    /// Snapshot sets of the two most recent ticks, if two are retained.
    pub(crate) fn latest_pair(&self, sync_group: &str) -> Option<SnapshotPair> {
        let groups = self.groups.read();
        let group = groups.get(sync_group)?;
        let (from, to) = group.latest_two()?;
        let before = group.snapshots.get(&from)?.clone();
        let after = group.snapshots.get(&to)?.clone();
        Some((before, after))
    }

    /// Snapshot sets of two specific ticks.
    pub(crate) fn pair(&self, sync_group: &str, from: u64, to: u64) -> CoreResult<SnapshotPair> {
        let groups = self.groups.read();
        let group = groups.get(sync_group).ok_or_else(|| CoreError::TickNotFound {
            sync_group: sync_group.to_string(),
            tick_number: from,
        })?;
        Ok((
            group.snapshots_of(sync_group, from)?.to_vec(),
            group.snapshots_of(sync_group, to)?.to_vec(),
        ))
    }
}
