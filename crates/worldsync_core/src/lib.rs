//! # WorldSync Core
//!
//! Shared-state engine for a multi-user virtual world.
//!
//! This crate provides:
//! - Entity store with per-sync-group permission checks
//! - Permission model with an explicit privileged identity
//! - Tick capture with retention and timing diagnostics
//! - Change detection between consecutive ticks

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod diff;
pub mod entity;
mod error;
pub mod permission;
pub mod sync_group;
pub mod tick;
mod types;
mod world;

pub use audit::{AuditKind, AuditTrail, MemoryAuditTrail, NoopAuditTrail, TouchedCounts};
pub use diff::{diff_entities, diff_snapshots, ChangeOperation, EntityChange};
pub use entity::{Entity, EntityPatch, EntityStore, NewEntity};
pub use error::{CoreError, CoreResult};
pub use permission::{Action, PermissionModel, SyncGroupRole};
pub use sync_group::{SyncGroup, SyncGroupRegistry};
pub use tick::{EntityStateSnapshot, Tick, TickEngine, TickStore, DEFAULT_CAPTURE_LOCK_TIMEOUT};
pub use types::{AgentId, EntityId, Identity, SessionId};
pub use world::{World, WorldBuilder};
