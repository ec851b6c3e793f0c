//! Tick capture, history and retention.

mod engine;
mod record;
mod store;

pub use engine::{TickEngine, DEFAULT_CAPTURE_LOCK_TIMEOUT};
pub use record::{EntityStateSnapshot, Tick};
pub use store::TickStore;
