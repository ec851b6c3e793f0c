//! Session manager behaviour without a network transport.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{agent_with_token, config, server, NORMAL};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;
use worldsync_core::{AgentId, ChangeOperation, Identity};
use worldsync_protocol::wire::{
    CLOSE_BACKPRESSURE, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_SESSION_INVALID, REASON_BACKPRESSURE,
};
use worldsync_protocol::{ErrorKind, QueryResult, ServerMessage};
use worldsync_server::{ConnectionHandle, ConnectionState, Outbound, WorldServer};
use worldsync_testkit::fixtures;

fn connect(server: &WorldServer, token: &str) -> (Arc<ConnectionHandle>, Receiver<Outbound>) {
    let (tx, mut rx) = server.manager().outbound_channel();
    let validation = server.manager().validator().validate(token);
    let handle = server.manager().register(&validation, token, tx).unwrap();
    assert!(matches!(
        rx.try_recv(),
        Ok(Outbound::Message(ServerMessage::ConnectionEstablished { .. }))
    ));
    (handle, rx)
}

fn reply(rx: &mut Receiver<Outbound>) -> ServerMessage {
    match rx.try_recv() {
        Ok(Outbound::Message(message)) => message,
        other => panic!("expected a message, got {other:?}"),
    }
}

#[test]
fn registration_requires_valid_session() {
    let server = server();
    let (tx, _rx) = server.manager().outbound_channel();
    let validation = server.manager().validator().validate("bogus");
    assert!(server.manager().register(&validation, "bogus", tx).is_err());
    assert_eq!(server.manager().connection_count(), 0);
}

#[test]
fn heartbeat_is_acknowledged() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);

    let request_id = Uuid::new_v4();
    server.manager().handle_text(
        &handle,
        &json!({"type": "HEARTBEAT", "requestId": request_id}).to_string(),
    );
    assert_eq!(
        reply(&mut rx),
        ServerMessage::HeartbeatAck {
            request_id: Some(request_id)
        }
    );
}

#[test]
fn unknown_type_yields_error_and_keeps_connection() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);

    server
        .manager()
        .handle_text(&handle, r#"{"type":"TELEPORT"}"#);
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::Error {
            kind: ErrorKind::UnknownType,
            ..
        }
    ));

    server.manager().handle_text(&handle, "{not json");
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::Error {
            kind: ErrorKind::Malformed,
            ..
        }
    ));

    assert_eq!(handle.state(), ConnectionState::Active);
    server
        .manager()
        .handle_text(&handle, r#"{"type":"CONFIG_REQUEST"}"#);
    let ServerMessage::ConfigResponse { config, .. } = reply(&mut rx) else {
        panic!("expected config response");
    };
    assert_eq!(config.heartbeat.timeout_ms, 5_000);
}

#[test]
fn query_permissions_are_enforced() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);

    let insert = json!({
        "type": "QUERY_REQUEST",
        "query": {"op": "INSERT", "entity": {"name": "chair", "syncGroup": NORMAL}}
    });
    server.manager().handle_text(&handle, &insert.to_string());
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::QueryResponse {
            result: QueryResult::Entity { .. },
            ..
        }
    ));

    let forbidden = json!({
        "type": "QUERY_REQUEST",
        "query": {"op": "LIST", "syncGroup": "public.STATIC"}
    });
    server.manager().handle_text(&handle, &forbidden.to_string());
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::Error {
            kind: ErrorKind::Permission,
            ..
        }
    ));
}

#[test]
fn sync_group_updates_report_tick_changes() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);
    let world = server.world();

    world.capture_tick(NORMAL).unwrap();
    let chair = world
        .entities()
        .insert(&Identity::System, fixtures::chair(NORMAL))
        .unwrap();
    world.capture_tick(NORMAL).unwrap();

    let request_id = Uuid::new_v4();
    server.manager().handle_text(
        &handle,
        &json!({"type": "SYNC_GROUP_UPDATES_REQUEST", "requestId": request_id, "syncGroup": NORMAL})
            .to_string(),
    );
    let ServerMessage::SyncGroupUpdatesResponse {
        request_id: echoed,
        sync_group,
        changes,
    } = reply(&mut rx)
    else {
        panic!("expected updates response");
    };
    assert_eq!(echoed, Some(request_id));
    assert_eq!(sync_group, NORMAL);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].entity_id, chair.entity_id);
    assert_eq!(changes[0].operation, ChangeOperation::Insert);

    server.manager().handle_text(
        &handle,
        &json!({"type": "SYNC_GROUP_UPDATES_REQUEST", "syncGroup": "public.STATIC"}).to_string(),
    );
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::Error {
            kind: ErrorKind::Permission,
            ..
        }
    ));
}

#[test]
fn stale_connection_is_closed_and_removed() {
    let server = WorldServer::new(config(Duration::from_millis(100), Duration::from_millis(500)))
        .unwrap();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);

    let report = server.manager().sweep_at(Utc::now());
    assert_eq!(report.timed_out, 0);
    assert_eq!(server.manager().connection_count(), 1);

    let later = handle.last_seen() + ChronoDuration::milliseconds(600);
    let report = server.manager().sweep_at(later);
    assert_eq!(report.timed_out, 1);
    assert_eq!(server.manager().connection_count(), 0);
    assert_eq!(handle.close_code(), Some(CLOSE_HEARTBEAT_TIMEOUT));
    assert_eq!(handle.state(), ConnectionState::Closed);
    assert_eq!(
        rx.try_recv().unwrap(),
        Outbound::Close {
            code: CLOSE_HEARTBEAT_TIMEOUT,
            reason: "heartbeat timeout".into()
        }
    );

    // Closing twice has no further effect.
    assert_eq!(server.manager().sweep_at(later).timed_out, 0);
    server.manager().disconnect(&handle);
}

#[test]
fn activity_defers_heartbeat_timeout() {
    let server = WorldServer::new(config(Duration::from_millis(100), Duration::from_millis(500)))
        .unwrap();
    let (_, token) = agent_with_token(&server);
    let (handle, _rx) = connect(&server, &token);
    let registered = handle.last_seen();

    std::thread::sleep(Duration::from_millis(20));
    server
        .manager()
        .handle_text(&handle, r#"{"type":"HEARTBEAT"}"#);
    assert!(handle.last_seen() > registered);

    let session_id = handle.session_id();
    let stored = server.manager().sessions().get(session_id).unwrap();
    assert_eq!(stored.last_seen, handle.last_seen());
}

#[test]
fn revoked_session_is_closed_on_sweep() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, _rx) = connect(&server, &token);

    server.manager().sessions().invalidate(handle.session_id());
    let report = server.manager().sweep_at(Utc::now());

    assert_eq!(report.invalidated, 1);
    assert_eq!(handle.close_code(), Some(CLOSE_SESSION_INVALID));
    assert_eq!(server.manager().connection_count(), 0);
}

#[test]
fn expired_session_is_deactivated_and_closed() {
    let server = server();
    let agent = AgentId::new();
    let issued = server
        .issuer()
        .issue_with_max_age(agent, Duration::from_secs(1))
        .unwrap();
    let (handle, _rx) = connect(&server, &issued.token);

    handle.touch(Utc::now() + ChronoDuration::seconds(2));
    let report = server.manager().sweep_at(Utc::now() + ChronoDuration::seconds(2));
    assert_eq!(report.expired_sessions, 1);
    assert_eq!(report.invalidated, 1);
    assert!(!server.manager().sessions().get(handle.session_id()).unwrap().active);
}

#[test]
fn new_connection_supersedes_old_one() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (first, _rx1) = connect(&server, &token);
    let (second, _rx2) = connect(&server, &token);

    assert_eq!(first.state(), ConnectionState::Closing);
    assert_eq!(second.state(), ConnectionState::Active);
    assert_eq!(server.manager().connection_count(), 1);

    // The superseded connection's cleanup must not remove the new one.
    server.manager().disconnect(&first);
    assert_eq!(server.manager().connection_count(), 1);
}

#[test]
fn slow_reader_is_closed_with_backpressure() {
    let server = WorldServer::new(
        config(Duration::from_secs(1), Duration::from_secs(5)).with_outbound_queue_capacity(4),
    )
    .unwrap();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);

    let heartbeat = json!({"type": "HEARTBEAT"}).to_string();
    for _ in 0..10 {
        server.manager().handle_text(&handle, &heartbeat);
    }
    assert_eq!(handle.state(), ConnectionState::Closing);
    assert_eq!(handle.close_code(), Some(CLOSE_BACKPRESSURE));

    let mut acks = 0;
    let close = loop {
        match rx.try_recv() {
            Ok(Outbound::Message(ServerMessage::HeartbeatAck { .. })) => acks += 1,
            other => break other,
        }
    };
    assert_eq!(acks, 3);
    assert_eq!(
        close.unwrap(),
        Outbound::Close {
            code: CLOSE_BACKPRESSURE,
            reason: REASON_BACKPRESSURE.into()
        }
    );

    // The gateway removes the connection once its reader sees the close.
    server.manager().disconnect(&handle);
    assert_eq!(server.manager().connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_are_answered_in_order_off_the_runtime() {
    let server = server();
    let (_, token) = agent_with_token(&server);
    let (handle, mut rx) = connect(&server, &token);
    let manager = Arc::clone(server.manager());

    let insert = Uuid::new_v4();
    let beat = Uuid::new_v4();
    manager
        .handle_frame(
            &handle,
            &json!({
                "type": "QUERY_REQUEST",
                "requestId": insert,
                "query": {"op": "INSERT", "entity": {"name": "chair", "syncGroup": NORMAL}}
            })
            .to_string(),
        )
        .await;
    manager
        .handle_frame(
            &handle,
            &json!({"type": "HEARTBEAT", "requestId": beat}).to_string(),
        )
        .await;
    manager.handle_frame(&handle, "not json").await;

    let ServerMessage::QueryResponse { request_id, result } = reply(&mut rx) else {
        panic!("expected query response");
    };
    assert_eq!(request_id, Some(insert));
    assert!(matches!(result, QueryResult::Entity { entity } if entity.name == "chair"));
    assert_eq!(reply(&mut rx), ServerMessage::HeartbeatAck { request_id: Some(beat) });
    assert!(matches!(
        reply(&mut rx),
        ServerMessage::Error {
            kind: ErrorKind::Malformed,
            ..
        }
    ));
}
