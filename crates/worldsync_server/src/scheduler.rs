//! Periodic tick capture and entity expiry.

use crate::error::{ServerError, ServerResult};
use crate::signal;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use worldsync_core::{Tick, World};

/// Retries of a capture that lost its group lock.
pub const MAX_CAPTURE_RETRIES: u32 = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Drives tick capture for every sync group and the expiry sweep.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    world: Arc<World>,
    expiry_interval: Duration,
}

impl TickScheduler {
    /// Creates a scheduler.
    pub fn new(world: Arc<World>, expiry_interval: Duration) -> Self {
        Self {
            world,
            expiry_interval,
        }
    }

    /// Spawns one capture loop per sync group plus the expiry sweep.
    /// Every task stops once `shutdown` is set.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks: Vec<JoinHandle<()>> = self
            .world
            .sync_groups()
            .all()
            .into_iter()
            .map(|group| {
                let world = Arc::clone(&self.world);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(group.tick_interval());
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    info!(sync_group = %group.name, rate_ms = group.tick_rate_ms, "tick loop started");
                    loop {
                        tokio::select! {
                            _ = signal::raised(&mut shutdown) => break,
                            _ = interval.tick() => {
                                if let Err(err) = capture_with_retry(&world, &group.name).await {
                                    error!(sync_group = %group.name, error = %err, "tick capture failed");
                                }
                            }
                        }
                    }
                    debug!(sync_group = %group.name, "tick loop stopped");
                })
            })
            .collect();

        let world = Arc::clone(&self.world);
        let every = self.expiry_interval;
        let mut shutdown = shutdown;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = signal::raised(&mut shutdown) => break,
                    _ = interval.tick() => {
                        if let Err(err) = world.sweep_expired(Utc::now()) {
                            warn!(error = %err, "expiry sweep failed");
                        }
                    }
                }
            }
        }));
        tasks
    }
}

/// Captures one tick off the async runtime, retrying lock contention
/// with exponential backoff.
pub async fn capture_with_retry(world: &Arc<World>, sync_group: &str) -> ServerResult<Tick> {
    let mut attempt = 0;
    loop {
        let world = Arc::clone(world);
        let group = sync_group.to_string();
        let result = tokio::task::spawn_blocking(move || world.capture_tick(&group))
            .await
            .map_err(|e| ServerError::Internal(format!("capture task failed: {e}")))?;
        match result {
            Err(err) if err.is_retryable() && attempt < MAX_CAPTURE_RETRIES => {
                attempt += 1;
                debug!(sync_group, attempt, "capture lock busy, retrying");
                tokio::time::sleep(RETRY_BACKOFF * 2u32.pow(attempt)).await;
            }
            other => return Ok(other?),
        }
    }
}
