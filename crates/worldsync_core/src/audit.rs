//! Audit trail seam used for tick diagnostics.
//!
//! Scripts and assets live outside the core. A tick only needs to know how
//! many distinct scripts and assets were touched since the previous tick,
//! which the [`AuditTrail`] collaborator reports.

use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Kind of audited object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    /// A script.
    Script,
    /// An asset.
    Asset,
}

/// Distinct objects touched within a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchedCounts {
    /// Distinct script ids.
    pub scripts: u64,
    /// Distinct asset ids.
    pub assets: u64,
}

/// Source of script/asset activity for a sync group.
pub trait AuditTrail: Send + Sync {
    /// Counts distinct scripts and assets touched in `sync_group` at or
    /// after `since`. `None` means "since the beginning".
    fn touched_since(
        &self,
        sync_group: &str,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<TouchedCounts>;
}

/// Audit trail that never reports activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditTrail;

impl AuditTrail for NoopAuditTrail {
    fn touched_since(
        &self,
        _sync_group: &str,
        _since: Option<DateTime<Utc>>,
    ) -> CoreResult<TouchedCounts> {
        Ok(TouchedCounts::default())
    }
}

#[derive(Debug, Clone)]
struct AuditRecord {
    kind: AuditKind,
    object_id: String,
    sync_group: String,
    at: DateTime<Utc>,
}

/// In-memory audit trail.
///
/// Counting a window with `since` set drops the group's records older than
/// `since`, so a trail polled once per tick stays bounded by the activity of
/// one tick interval. Callers must ask for non-decreasing `since` values per
/// group. Groups that are never polled keep growing until
/// [`MemoryAuditTrail::truncate_before`] is called.
#[derive(Debug, Default)]
pub struct MemoryAuditTrail {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditTrail {
    /// Creates an empty audit trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an object was touched now.
    pub fn record(&self, kind: AuditKind, object_id: impl Into<String>, sync_group: impl Into<String>) {
        self.record_at(kind, object_id, sync_group, Utc::now());
    }

    /// Records that an object was touched at `at`.
    pub fn record_at(
        &self,
        kind: AuditKind,
        object_id: impl Into<String>,
        sync_group: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.records.write().push(AuditRecord {
            kind,
            object_id: object_id.into(),
            sync_group: sync_group.into(),
            at,
        });
    }

    /// Drops records older than `cutoff`.
    pub fn truncate_before(&self, cutoff: DateTime<Utc>) {
        self.records.write().retain(|record| record.at >= cutoff);
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuditTrail for MemoryAuditTrail {
    fn touched_since(
        &self,
        sync_group: &str,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<TouchedCounts> {
        let mut records = self.records.write();
        if let Some(since) = since {
            records.retain(|r| r.sync_group != sync_group || r.at >= since);
        }
        let mut scripts = HashSet::new();
        let mut assets = HashSet::new();
        for record in records.iter().filter(|r| {
            r.sync_group == sync_group && since.map_or(true, |since| r.at >= since)
        }) {
            match record.kind {
                AuditKind::Script => scripts.insert(record.object_id.as_str()),
                AuditKind::Asset => assets.insert(record.object_id.as_str()),
            };
        }
        Ok(TouchedCounts {
            scripts: scripts.len() as u64,
            assets: assets.len() as u64,
        })
    }
}
