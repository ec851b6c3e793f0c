//! Concurrent load against a world.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use worldsync_core::{EntityPatch, Identity, World};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of capture threads.
    pub capture_threads: usize,
    /// Captures per capture thread.
    pub captures_per_thread: usize,
    /// Number of writer threads updating entities meanwhile.
    pub writer_threads: usize,
    /// Updates per writer thread.
    pub writes_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            capture_threads: 4,
            captures_per_thread: 50,
            writer_threads: 2,
            writes_per_thread: 200,
        }
    }
}

/// Captures ticks of `sync_group` from several threads while others
/// rewrite the group's entities. Only capture outcomes are counted.
pub fn concurrent_capture(
    world: &Arc<World>,
    sync_group: &str,
    config: &StressConfig,
) -> StressTestResult {
    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let ids: Vec<_> = world
        .entities()
        .list_group(&Identity::System, sync_group)
        .map(|entities| entities.into_iter().map(|e| e.entity_id).collect())
        .unwrap_or_default();

    thread::scope(|scope| {
        for _ in 0..config.capture_threads {
            let (succeeded, failed) = (Arc::clone(&succeeded), Arc::clone(&failed));
            scope.spawn(move || {
                for _ in 0..config.captures_per_thread {
                    match world.capture_tick(sync_group) {
                        Ok(_) => succeeded.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
        for writer in 0..config.writer_threads {
            let ids = &ids;
            scope.spawn(move || {
                if ids.is_empty() {
                    return;
                }
                for n in 0..config.writes_per_thread {
                    let id = ids[(writer + n) % ids.len()];
                    let patch = EntityPatch::new().meta_data(serde_json::json!({ "w": writer, "n": n }));
                    let _ = world.entities().update(&Identity::System, id, patch);
                }
            });
        }
    });

    StressTestResult::new(
        succeeded.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{populate, single_group_world};

    #[test]
    fn tick_numbers_stay_contiguous_under_load() {
        let world = Arc::new(single_group_world("g"));
        populate(&world, "g", 10);
        let config = StressConfig {
            capture_threads: 4,
            captures_per_thread: 20,
            writer_threads: 2,
            writes_per_thread: 100,
        };

        let result = concurrent_capture(&world, "g", &config);
        assert_eq!(result.total_ops, 80);

        let numbers: Vec<u64> = world
            .ticks()
            .ticks("g")
            .unwrap()
            .iter()
            .map(|t| t.tick_number)
            .collect();
        assert_eq!(numbers.len(), result.successful_ops);
        assert!(numbers.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
