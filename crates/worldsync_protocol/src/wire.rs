//! Connection-level constants.

/// Prefix of the credential-carrying WebSocket subprotocol.
pub const BEARER_PROTOCOL_PREFIX: &str = "bearer.";

/// Close code sent when a connection misses its heartbeats.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Close reason paired with [`CLOSE_HEARTBEAT_TIMEOUT`].
pub const REASON_HEARTBEAT_TIMEOUT: &str = "heartbeat timeout";

/// Close code sent when the backing session no longer validates.
pub const CLOSE_SESSION_INVALID: u16 = 4001;

/// Close reason paired with [`CLOSE_SESSION_INVALID`].
pub const REASON_SESSION_INVALID: &str = "session invalid";

/// Close code sent when a client reads too slowly and its outbound queue
/// fills up.
pub const CLOSE_BACKPRESSURE: u16 = 4002;

/// Close reason paired with [`CLOSE_BACKPRESSURE`].
pub const REASON_BACKPRESSURE: &str = "backpressure";

/// Close code for an orderly server shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// WebSocket upgrade route.
pub const WS_PATH: &str = "/world/ws";

/// Session validation route.
pub const VALIDATE_PATH: &str = "/world/rest/session/validate";

/// Session logout route.
pub const LOGOUT_PATH: &str = "/world/rest/session/logout";

/// Liveness route.
pub const HEALTH_PATH: &str = "/world/health";

/// Builds the subprotocol value carrying `token`.
pub fn bearer_protocol(token: &str) -> String {
    format!("{BEARER_PROTOCOL_PREFIX}{token}")
}

/// Finds the bearer token among comma-separated offered subprotocols.
///
/// Returns the full matched subprotocol and the token it carries.
pub fn find_bearer_protocol(offered: &str) -> Option<(&str, &str)> {
    offered
        .split(',')
        .map(str::trim)
        .find_map(|p| {
            p.strip_prefix(BEARER_PROTOCOL_PREFIX)
                .filter(|token| !token.is_empty())
                .map(|token| (p, token))
        })
}
