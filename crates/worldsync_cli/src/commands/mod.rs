//! CLI command implementations.

pub mod check_config;
pub mod serve;

use std::net::SocketAddr;
use std::path::Path;
use worldsync_server::{ServerConfig, ServerResult};

/// Loads the config file (or defaults) and applies command-line overrides.
pub fn load_config(
    path: Option<&Path>,
    bind: Option<SocketAddr>,
    auth_secret: Option<String>,
) -> ServerResult<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(secret) = auth_secret {
        config = config.with_auth_secret(secret);
    }
    config.validate()?;
    Ok(config)
}
