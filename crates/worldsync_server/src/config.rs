//! Server configuration.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use worldsync_core::SyncGroup;
use worldsync_protocol::{HeartbeatSettings, RuntimeConfig, SessionSettings};

/// Minimum length of the credential signing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// Smallest usable outbound queue: one message plus the close frame.
pub const MIN_OUTBOUND_QUEUE: usize = 2;

/// Configuration for the world server.
///
/// Loaded from a JSON file with camelCase keys; every key is optional and
/// falls back to [`ServerConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// How often clients should send a heartbeat, and how often the
    /// connection sweep runs.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is closed.
    pub heartbeat_timeout_ms: u64,
    /// Lifetime of an issued session.
    pub session_max_age_ms: u64,
    /// How often inactive session records are discarded.
    pub session_cleanup_interval_ms: u64,
    /// Bound on waiting for a sync group's capture lock.
    pub capture_lock_timeout_ms: u64,
    /// How often expired entities are deleted.
    pub expiry_sweep_interval_ms: u64,
    /// Frames a connection may have queued before it is closed as too slow.
    pub outbound_queue_capacity: usize,
    /// Name recorded as the auth provider of issued sessions.
    pub auth_provider: String,
    /// Secret for credential signatures. Usually supplied from the
    /// environment rather than the file.
    #[serde(skip_serializing)]
    pub auth_secret: Option<String>,
    /// Sync groups of the world.
    pub sync_groups: Vec<SyncGroup>,
}

impl ServerConfig {
    /// Creates a configuration bound to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 15_000,
            session_max_age_ms: 24 * 60 * 60 * 1000,
            session_cleanup_interval_ms: 60_000,
            capture_lock_timeout_ms: 500,
            expiry_sweep_interval_ms: 1_000,
            outbound_queue_capacity: 256,
            auth_provider: "local".to_string(),
            auth_secret: None,
            sync_groups: SyncGroup::defaults(),
        }
    }

    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> ServerResult<Self> {
        serde_json::from_str(json).map_err(|e| ServerError::Config(format!("invalid config: {e}")))
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Sets the heartbeat interval and timeout.
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self.heartbeat_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the session lifetime.
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age_ms = duration_ms(max_age);
        self
    }

    /// Sets the signing secret.
    pub fn with_auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth_secret = Some(secret.into());
        self
    }

    /// Replaces the sync groups.
    pub fn with_sync_groups(mut self, groups: Vec<SyncGroup>) -> Self {
        self.sync_groups = groups;
        self
    }

    /// Sets the capture lock timeout.
    pub fn with_capture_lock_timeout(mut self, timeout: Duration) -> Self {
        self.capture_lock_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the per-connection outbound queue capacity.
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    /// Checks the configuration can start a server.
    pub fn validate(&self) -> ServerResult<()> {
        match &self.auth_secret {
            None => return Err(ServerError::Config("auth secret is required".into())),
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                return Err(ServerError::Config(format!(
                    "auth secret must be at least {MIN_SECRET_LEN} bytes"
                )))
            }
            Some(_) => {}
        }
        let positive = [
            ("heartbeatIntervalMs", self.heartbeat_interval_ms),
            ("heartbeatTimeoutMs", self.heartbeat_timeout_ms),
            ("sessionMaxAgeMs", self.session_max_age_ms),
            ("sessionCleanupIntervalMs", self.session_cleanup_interval_ms),
            ("captureLockTimeoutMs", self.capture_lock_timeout_ms),
            ("expirySweepIntervalMs", self.expiry_sweep_interval_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ServerError::Config(format!("{name} must be positive")));
        }
        if self.outbound_queue_capacity < MIN_OUTBOUND_QUEUE {
            return Err(ServerError::Config(format!(
                "outboundQueueCapacity must be at least {MIN_OUTBOUND_QUEUE}"
            )));
        }
        if self.heartbeat_timeout_ms < self.heartbeat_interval_ms {
            return Err(ServerError::Config(
                "heartbeatTimeoutMs must not be shorter than heartbeatIntervalMs".into(),
            ));
        }
        if self.sync_groups.is_empty() {
            return Err(ServerError::Config("at least one sync group is required".into()));
        }
        for group in &self.sync_groups {
            group
                .validate()
                .map_err(|e| ServerError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Session lifetime.
    pub fn session_max_age(&self) -> Duration {
        Duration::from_millis(self.session_max_age_ms)
    }

    /// Inactive session cleanup interval.
    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.session_cleanup_interval_ms)
    }

    /// Capture lock timeout.
    pub fn capture_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_lock_timeout_ms)
    }

    /// Entity expiry sweep interval.
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_interval_ms)
    }

    /// The timing advertised to clients in `CONFIG_RESPONSE`.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            heartbeat: HeartbeatSettings {
                interval_ms: self.heartbeat_interval_ms,
                timeout_ms: self.heartbeat_timeout_ms,
            },
            session: SessionSettings {
                max_age_ms: self.session_max_age_ms,
                cleanup_interval_ms: self.session_cleanup_interval_ms,
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
