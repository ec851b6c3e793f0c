//! Live connection registry.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::warn;
use worldsync_core::{AgentId, Identity, SessionId};
use worldsync_protocol::wire::{CLOSE_BACKPRESSURE, REASON_BACKPRESSURE};
use worldsync_protocol::ServerMessage;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake validated, not yet registered.
    Connecting,
    /// Registered and exchanging messages.
    Active,
    /// A close has been requested.
    Closing,
    /// Removed from the registry.
    Closed,
}

/// Frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A protocol message.
    Message(ServerMessage),
    /// Close the connection with a code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

#[derive(Debug)]
struct Bookkeeping {
    state: ConnectionState,
    last_seen: DateTime<Utc>,
    close_code: Option<u16>,
}

/// The manager's view of one transport connection.
///
/// Holds only the outbound queue and a close signal; the socket itself is
/// owned by the gateway's connection tasks.
///
/// The queue is bounded. Messages may fill all but its last slot, which is
/// kept for the close frame. A message that finds no room closes the
/// connection with [`CLOSE_BACKPRESSURE`].
#[derive(Debug)]
pub struct ConnectionHandle {
    session_id: SessionId,
    agent_id: AgentId,
    token: String,
    outbound: mpsc::Sender<Outbound>,
    closed: watch::Sender<bool>,
    book: Mutex<Bookkeeping>,
}

impl ConnectionHandle {
    /// Creates a handle in the `Connecting` state.
    pub fn new(
        session_id: SessionId,
        agent_id: AgentId,
        token: impl Into<String>,
        outbound: mpsc::Sender<Outbound>,
        now: DateTime<Utc>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            session_id,
            agent_id,
            token: token.into(),
            outbound,
            closed,
            book: Mutex::new(Bookkeeping {
                state: ConnectionState::Connecting,
                last_seen: now,
                close_code: None,
            }),
        }
    }

    /// Backing session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Authenticated agent.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Identity requests on this connection run as.
    pub fn identity(&self) -> Identity {
        Identity::Agent(self.agent_id)
    }

    /// Credential presented at handshake.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.book.lock().state
    }

    /// Last inbound activity.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.book.lock().last_seen
    }

    /// Close code sent, if the connection was closed by the server.
    pub fn close_code(&self) -> Option<u16> {
        self.book.lock().close_code
    }

    /// Subscribes to the close signal.
    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub(crate) fn activate(&self) -> bool {
        let mut book = self.book.lock();
        if book.state == ConnectionState::Connecting {
            book.state = ConnectionState::Active;
            true
        } else {
            false
        }
    }

    /// Records inbound activity. Ignored once closing.
    pub fn touch(&self, now: DateTime<Utc>) {
        let mut book = self.book.lock();
        if book.state == ConnectionState::Active && now > book.last_seen {
            book.last_seen = now;
        }
    }

    /// Queues a message. Sending to a closing or dropped connection is a
    /// no-op; returns whether the message was queued.
    ///
    /// Never waits: if the queue is full the connection is closed with
    /// [`CLOSE_BACKPRESSURE`] and the message is dropped.
    pub fn send(&self, message: ServerMessage) -> bool {
        {
            let book = self.book.lock();
            if book.state != ConnectionState::Active || self.outbound.is_closed() {
                return false;
            }
            if self.outbound.capacity() > 1 {
                return self.outbound.try_send(Outbound::Message(message)).is_ok();
            }
        }
        warn!(session_id = %self.session_id, "outbound queue full, closing slow connection");
        self.close(CLOSE_BACKPRESSURE, REASON_BACKPRESSURE);
        false
    }

    /// Requests a close. Only the first call has an effect; returns
    /// whether this call initiated the close.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        {
            let mut book = self.book.lock();
            match book.state {
                ConnectionState::Closing | ConnectionState::Closed => return false,
                ConnectionState::Connecting | ConnectionState::Active => {
                    book.state = ConnectionState::Closing;
                    book.close_code = Some(code);
                }
            }
            // The reserved slot is free while the lock is held.
            let _ = self.outbound.try_send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
        self.closed.send_replace(true);
        true
    }

    pub(crate) fn mark_closed(&self) {
        self.book.lock().state = ConnectionState::Closed;
        self.closed.send_replace(true);
    }
}

/// Live connections keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: RwLock<HashMap<SessionId, Arc<ConnectionHandle>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connection, returning the one it replaced.
    pub fn insert(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().insert(handle.session_id(), handle)
    }

    /// Removes `handle` if it is still the recorded connection for its session.
    pub fn remove(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let mut connections = self.connections.write();
        match connections.get(&handle.session_id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                connections.remove(&handle.session_id());
                true
            }
            _ => false,
        }
    }

    /// Looks up the connection of a session.
    pub fn get(&self, session_id: SessionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().get(&session_id).cloned()
    }

    /// Returns every live connection.
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns true if nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (Arc<ConnectionHandle>, mpsc::Receiver<Outbound>) {
        handle_with_capacity(16)
    }

    fn handle_with_capacity(capacity: usize) -> (Arc<ConnectionHandle>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(SessionId::new(), AgentId::new(), "t", tx, Utc::now());
        (Arc::new(handle), rx)
    }

    #[test]
    fn lifecycle() {
        let (handle, mut rx) = handle();
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(!handle.send(ServerMessage::HeartbeatAck { request_id: None }));

        assert!(handle.activate());
        assert!(handle.send(ServerMessage::HeartbeatAck { request_id: None }));
        assert!(handle.close(4000, "heartbeat timeout"));
        assert!(!handle.close(4001, "session invalid"));
        assert_eq!(handle.close_code(), Some(4000));
        assert!(*handle.subscribe_close().borrow());

        assert!(matches!(rx.try_recv(), Ok(Outbound::Message(_))));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                code: 4000,
                reason: "heartbeat timeout".into()
            }
        );
        assert!(!handle.send(ServerMessage::HeartbeatAck { request_id: None }));
    }

    #[test]
    fn send_after_receiver_dropped_is_noop() {
        let (handle, rx) = handle();
        handle.activate();
        drop(rx);
        assert!(!handle.send(ServerMessage::HeartbeatAck { request_id: None }));
        assert!(handle.close(4000, "heartbeat timeout"));
    }

    #[test]
    fn full_queue_closes_with_backpressure() {
        let (handle, mut rx) = handle_with_capacity(4);
        handle.activate();
        let mut queued = 0;
        while handle.send(ServerMessage::HeartbeatAck { request_id: None }) {
            queued += 1;
        }
        assert_eq!(queued, 3);
        assert_eq!(handle.state(), ConnectionState::Closing);
        assert_eq!(handle.close_code(), Some(CLOSE_BACKPRESSURE));
        assert!(*handle.subscribe_close().borrow());

        for _ in 0..queued {
            assert!(matches!(rx.try_recv(), Ok(Outbound::Message(_))));
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                code: CLOSE_BACKPRESSURE,
                reason: REASON_BACKPRESSURE.into()
            }
        );
    }

    #[test]
    fn draining_makes_room_again() {
        let (handle, mut rx) = handle_with_capacity(2);
        handle.activate();
        assert!(handle.send(ServerMessage::HeartbeatAck { request_id: None }));
        assert!(rx.try_recv().is_ok());
        assert!(handle.send(ServerMessage::HeartbeatAck { request_id: None }));
        assert_eq!(handle.state(), ConnectionState::Active);
    }

    #[test]
    fn remove_only_matching_handle() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = handle();
        registry.insert(Arc::clone(&first));

        let (tx, _rx2) = mpsc::channel(16);
        let second = Arc::new(ConnectionHandle::new(
            first.session_id(),
            first.agent_id(),
            "t",
            tx,
            Utc::now(),
        ));
        let replaced = registry.insert(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));

        assert!(!registry.remove(&first));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&second));
        assert!(registry.is_empty());
    }

    #[test]
    fn touch_is_monotonic() {
        let (handle, _rx) = handle();
        handle.activate();
        let seen = handle.last_seen();
        handle.touch(seen - chrono::Duration::seconds(1));
        assert_eq!(handle.last_seen(), seen);
        handle.touch(seen + chrono::Duration::seconds(1));
        assert!(handle.last_seen() > seen);
    }
}
