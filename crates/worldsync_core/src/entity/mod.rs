//! Entity types and storage.

mod model;
mod store;

pub use model::{Entity, EntityPatch, NewEntity};
pub use store::EntityStore;
