//! # WorldSync Testkit
//!
//! Test utilities for WorldSync.
//!
//! This crate provides:
//! - World fixtures with stock sync groups and agents
//! - Property-based generators for entities, patches and client frames
//! - Concurrent tick capture stress runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use worldsync_testkit::prelude::*;
//!
//! #[test]
//! fn agent_can_insert() {
//!     let world = stock_world();
//!     let agent = agent_with_role(&world, NORMAL, Role::Full);
//!     world.entities().insert(&agent, chair(NORMAL)).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
