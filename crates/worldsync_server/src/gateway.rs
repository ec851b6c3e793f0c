//! HTTP and WebSocket routes.

use crate::error::ServerError;
use crate::manager::SessionManager;
use crate::registry::Outbound;
use crate::signal;
use crate::validator::Validation;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use worldsync_protocol::wire::{
    find_bearer_protocol, HEALTH_PATH, LOGOUT_PATH, VALIDATE_PATH, WS_PATH,
};
use worldsync_protocol::{
    ApiResponse, ErrorKind, HealthData, ServerMessage, SessionValidationData,
};

/// How long a finished connection waits for queued frames to flush.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Builds the router serving every route of the gateway.
pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route(VALIDATE_PATH, post(validate_handler))
        .route(LOGOUT_PATH, post(logout_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(manager)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn ws_handler(
    State(manager): State<Arc<SessionManager>>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let offered = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(find_bearer_protocol)
        .map(|(protocol, token)| (protocol.to_string(), token.to_string()));
    let Some((protocol, token)) = offered else {
        return ServerError::Authentication("missing bearer subprotocol".into()).into_response();
    };

    let validation = manager.validator().validate(&token);
    if !validation.is_valid {
        return ServerError::Authentication("session invalid".into()).into_response();
    }
    let Some(upgrade) = upgrade else {
        return ServerError::InvalidRequest("websocket upgrade required".into()).into_response();
    };

    upgrade
        .protocols([protocol])
        .on_upgrade(move |socket| run_connection(manager, socket, validation, token))
}

/// Drives one upgraded connection until either side closes it.
async fn run_connection(
    manager: Arc<SessionManager>,
    socket: WebSocket,
    validation: Validation,
    token: String,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = manager.outbound_channel();

    let handle = match manager.register(&validation, &token, tx) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(error = %err, "registration failed");
            return;
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::Text(text),
                    Err(err) => {
                        warn!(error = %err, "cannot encode outbound message");
                        continue;
                    }
                },
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if let Err(err) = sink.send(frame).await {
                debug!(error = %err, "write to closed connection dropped");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut closed = handle.subscribe_close();
    loop {
        tokio::select! {
            _ = signal::raised(&mut closed) => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => manager.handle_frame(&handle, &text).await,
                Some(Ok(Message::Binary(_))) => {
                    manager.touch(&handle);
                    handle.send(ServerMessage::error(
                        None,
                        ErrorKind::Malformed,
                        "binary frames are not supported",
                    ));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => manager.touch(&handle),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(session_id = %handle.session_id(), error = %err, "connection dropped");
                    break;
                }
            }
        }
    }

    manager.disconnect(&handle);
    drop(handle);
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        abort.abort();
    }
}

async fn validate_handler(
    State(manager): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionValidationData>>, ServerError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ServerError::Authentication("missing bearer token".into()))?;
    let validation = manager.validator().validate(token);
    match validation.identity() {
        Some((agent_id, _)) => Ok(Json(ApiResponse::ok(SessionValidationData {
            is_valid: true,
            agent_id,
        }))),
        None => Err(ServerError::Authentication("session invalid".into())),
    }
}

async fn logout_handler(
    State(manager): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ServerError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ServerError::Authentication("missing bearer token".into()))?;
    let claims = manager.validator().signer().decode(token)?;
    if manager.sessions().invalidate(claims.session_id) {
        debug!(session_id = %claims.session_id, "session logged out");
    }
    Ok(Json(ApiResponse::done()))
}

async fn health_handler(State(manager): State<Arc<SessionManager>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::ok(HealthData {
            status: "ok".to_string(),
            connections: manager.connection_count(),
            sync_groups: manager.world().sync_groups().len(),
        })),
    )
}
