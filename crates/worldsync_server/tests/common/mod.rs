//! Shared fixtures for server integration tests.

#![allow(dead_code)]

use std::time::Duration;
use worldsync_core::{AgentId, Identity, SyncGroupRole};
use worldsync_server::{ServerConfig, WorldServer};

pub const SECRET: &str = "integration-test-secret-0123";
pub const NORMAL: &str = "public.NORMAL";

pub fn config(heartbeat_interval: Duration, heartbeat_timeout: Duration) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_auth_secret(SECRET)
        .with_heartbeat(heartbeat_interval, heartbeat_timeout)
}

pub fn server() -> WorldServer {
    WorldServer::new(config(Duration::from_secs(1), Duration::from_secs(5))).unwrap()
}

/// Issues a credential for a new agent with full rights in `public.NORMAL`.
pub fn agent_with_token(server: &WorldServer) -> (AgentId, String) {
    let agent = AgentId::new();
    server
        .world()
        .permissions()
        .set_role(&Identity::System, SyncGroupRole::full(agent, NORMAL))
        .unwrap();
    let issued = server.issuer().issue(agent).unwrap();
    (agent, issued.token)
}
