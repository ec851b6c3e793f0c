//! Session manager: live connections, heartbeats and message dispatch.

use crate::config::{ServerConfig, MIN_OUTBOUND_QUEUE};
use crate::error::{ServerError, ServerResult};
use crate::query;
use crate::registry::{ConnectionHandle, ConnectionState, Outbound, SessionRegistry};
use crate::session::SessionStore;
use crate::signal;
use crate::validator::{SessionValidator, Validation};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use worldsync_core::{Action, CoreResult, EntityChange, Identity, World};
use worldsync_protocol::wire::{
    CLOSE_GOING_AWAY, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_SESSION_INVALID, REASON_HEARTBEAT_TIMEOUT,
    REASON_SESSION_INVALID,
};
use worldsync_protocol::{
    parse_client_message, ClientMessage, EntityQuery, ErrorKind, ProtocolError, QueryResult,
    RuntimeConfig, ServerMessage,
};

/// Connections closed by one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Closed for missing heartbeats.
    pub timed_out: usize,
    /// Closed because the session no longer validates.
    pub invalidated: usize,
    /// Session records deactivated for expiry.
    pub expired_sessions: usize,
}

/// Owns the live connections of one server.
#[derive(Debug)]
pub struct SessionManager {
    world: Arc<World>,
    validator: SessionValidator,
    registry: SessionRegistry,
    heartbeat_interval: Duration,
    heartbeat_timeout: chrono::Duration,
    session_cleanup_interval: Duration,
    outbound_capacity: usize,
    runtime_config: RuntimeConfig,
}

impl SessionManager {
    /// Creates a manager.
    pub fn new(world: Arc<World>, validator: SessionValidator, config: &ServerConfig) -> Self {
        Self {
            world,
            validator,
            registry: SessionRegistry::new(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: chrono::Duration::milliseconds(
                i64::try_from(config.heartbeat_timeout_ms).unwrap_or(i64::MAX),
            ),
            session_cleanup_interval: config.session_cleanup_interval(),
            outbound_capacity: config.outbound_queue_capacity.max(MIN_OUTBOUND_QUEUE),
            runtime_config: config.runtime_config(),
        }
    }

    /// The world served.
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// The credential validator.
    pub fn validator(&self) -> &SessionValidator {
        &self.validator
    }

    /// The session records.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.validator.sessions()
    }

    /// Live connections.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Creates the bounded outbound queue for a new connection.
    pub fn outbound_channel(&self) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(self.outbound_capacity)
    }

    /// Registers a connection for a validated credential and greets it
    /// with `CONNECTION_ESTABLISHED`.
    ///
    /// A previous connection of the same session is closed.
    pub fn register(
        &self,
        validation: &Validation,
        token: &str,
        outbound: mpsc::Sender<Outbound>,
    ) -> ServerResult<Arc<ConnectionHandle>> {
        let (agent_id, session_id) = validation
            .identity()
            .ok_or_else(|| ServerError::Authentication("session invalid".into()))?;

        let handle = Arc::new(ConnectionHandle::new(
            session_id,
            agent_id,
            token,
            outbound,
            Utc::now(),
        ));
        handle.activate();
        if let Some(previous) = self.registry.insert(Arc::clone(&handle)) {
            debug!(%session_id, "replacing previous connection");
            previous.close(CLOSE_SESSION_INVALID, REASON_SESSION_INVALID);
        }
        handle.send(ServerMessage::ConnectionEstablished {
            agent_id,
            session_id,
        });
        info!(%agent_id, %session_id, "connection registered");
        Ok(handle)
    }

    /// Records inbound activity on a connection.
    pub fn touch(&self, handle: &ConnectionHandle) {
        let now = Utc::now();
        handle.touch(now);
        self.sessions().touch(handle.session_id(), now);
    }

    /// Processes one inbound text frame and queues the reply.
    pub fn handle_text(&self, handle: &ConnectionHandle, text: &str) {
        self.touch(handle);
        let reply = match parse_client_message(text) {
            Ok(message) => self.dispatch(&handle.identity(), message),
            Err(err) => Self::undecodable(handle, &err),
        };
        handle.send(reply);
    }

    /// Async form of [`SessionManager::handle_text`] used by the gateway.
    ///
    /// Queries and update requests run on the blocking pool; heartbeats and
    /// config requests are answered inline. The reply is queued before this
    /// returns, so frames of one connection are answered in order.
    pub async fn handle_frame(self: &Arc<Self>, handle: &ConnectionHandle, text: &str) {
        self.touch(handle);
        let message = match parse_client_message(text) {
            Ok(message) => message,
            Err(err) => {
                handle.send(Self::undecodable(handle, &err));
                return;
            }
        };
        let identity = handle.identity();
        let reply = if reads_world(&message) {
            let request_id = message.request_id();
            let manager = Arc::clone(self);
            tokio::task::spawn_blocking(move || manager.dispatch(&identity, message))
                .await
                .unwrap_or_else(|err| {
                    warn!(session_id = %handle.session_id(), error = %err, "request task failed");
                    ServerMessage::error(request_id, ErrorKind::Internal, "request failed")
                })
        } else {
            self.dispatch(&identity, message)
        };
        handle.send(reply);
    }

    fn undecodable(handle: &ConnectionHandle, err: &ProtocolError) -> ServerMessage {
        debug!(session_id = %handle.session_id(), error = %err, "undecodable frame");
        ServerMessage::from_protocol_error(err)
    }

    /// Computes the reply to a client message.
    pub fn dispatch(&self, identity: &Identity, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Heartbeat { request_id } => ServerMessage::HeartbeatAck { request_id },
            ClientMessage::ConfigRequest { request_id } => ServerMessage::ConfigResponse {
                request_id,
                config: self.runtime_config,
            },
            ClientMessage::QueryRequest { request_id, query } => {
                match self.run_query(identity, query) {
                    Ok(result) => ServerMessage::QueryResponse { request_id, result },
                    Err(err) => ServerMessage::from_core_error(request_id, &err),
                }
            }
            ClientMessage::SyncGroupUpdatesRequest {
                request_id,
                sync_group,
            } => match self.sync_group_updates(identity, &sync_group) {
                Ok(changes) => ServerMessage::SyncGroupUpdatesResponse {
                    request_id,
                    sync_group,
                    changes,
                },
                Err(err) => ServerMessage::from_core_error(request_id, &err),
            },
        }
    }

    fn run_query(&self, identity: &Identity, query: EntityQuery) -> CoreResult<QueryResult> {
        query::execute(&self.world, identity, query)
    }

    fn sync_group_updates(
        &self,
        identity: &Identity,
        sync_group: &str,
    ) -> CoreResult<Vec<EntityChange>> {
        self.world.sync_groups().get(sync_group)?;
        self.world
            .permissions()
            .require(identity, sync_group, Action::Read)?;
        self.world.changes_since_last_tick(sync_group)
    }

    /// Closes stale and invalidated connections and deactivates expired
    /// sessions, as of `now`.
    ///
    /// Closing only signals the connection's tasks, so one slow socket
    /// never delays the others.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            expired_sessions: self.sessions().invalidate_expired(now).len(),
            ..SweepReport::default()
        };

        for handle in self.registry.all() {
            if handle.state() != ConnectionState::Active {
                continue;
            }
            if now - handle.last_seen() > self.heartbeat_timeout {
                if handle.close(CLOSE_HEARTBEAT_TIMEOUT, REASON_HEARTBEAT_TIMEOUT) {
                    info!(session_id = %handle.session_id(), "heartbeat timeout");
                    report.timed_out += 1;
                }
                self.disconnect(&handle);
            } else if !self.validator.validate_at(handle.token(), now).is_valid {
                if handle.close(CLOSE_SESSION_INVALID, REASON_SESSION_INVALID) {
                    info!(session_id = %handle.session_id(), "session no longer valid");
                    report.invalidated += 1;
                }
                self.disconnect(&handle);
            }
        }
        if report != SweepReport::default() {
            debug!(?report, "session sweep");
        }
        report
    }

    /// Removes a connection. Safe to call more than once.
    pub fn disconnect(&self, handle: &Arc<ConnectionHandle>) {
        if self.registry.remove(handle) {
            debug!(session_id = %handle.session_id(), "connection removed");
        }
        handle.mark_closed();
    }

    /// Closes every connection with the given code.
    pub fn close_all(&self, code: u16, reason: &str) {
        for handle in self.registry.all() {
            handle.close(code, reason);
            self.disconnect(&handle);
        }
    }

    /// Runs the heartbeat sweep and session cleanup until `shutdown` is set.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(manager.heartbeat_interval);
            let mut cleanup = tokio::time::interval(manager.session_cleanup_interval);
            loop {
                tokio::select! {
                    _ = signal::raised(&mut shutdown) => break,
                    _ = sweep.tick() => {
                        manager.sweep_at(Utc::now());
                    }
                    _ = cleanup.tick() => {
                        let purged = manager.sessions().purge_inactive();
                        if purged > 0 {
                            debug!(purged, "inactive sessions purged");
                        }
                    }
                }
            }
            manager.close_all(CLOSE_GOING_AWAY, "server shutting down");
            info!("session sweeper stopped");
        })
    }
}

/// Whether answering `message` touches the entity store or tick buffers.
fn reads_world(message: &ClientMessage) -> bool {
    matches!(
        message,
        ClientMessage::QueryRequest { .. } | ClientMessage::SyncGroupUpdatesRequest { .. }
    )
}
