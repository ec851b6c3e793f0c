//! # WorldSync Server
//!
//! Network front of a WorldSync world.
//!
//! This crate provides:
//! - WebSocket gateway with bearer-subprotocol authentication
//! - REST session validation and logout
//! - Session manager with heartbeat liveness and message dispatch
//! - HMAC-SHA256 signed session credentials
//! - Per-sync-group tick scheduling
//!
//! # Authentication
//!
//! Clients present `bearer.<token>` in `Sec-WebSocket-Protocol`. A token is
//! valid only while its session record is active:
//!
//! ```rust,ignore
//! use worldsync_server::{ServerConfig, WorldServer};
//!
//! let server = WorldServer::new(ServerConfig::default().with_auth_secret(secret))?;
//! let issued = server.issuer().issue(agent_id)?;
//! // connect with subprotocol format!("bearer.{}", issued.token)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod gateway;
mod issuer;
mod manager;
mod query;
mod registry;
mod scheduler;
mod server;
mod session;
mod signal;
mod validator;

pub use auth::{AuthConfig, SessionClaims, TokenSigner};
pub use config::{ServerConfig, MIN_OUTBOUND_QUEUE, MIN_SECRET_LEN};
pub use error::{ServerError, ServerResult};
pub use gateway::router;
pub use issuer::{CredentialIssuer, IssuedCredential};
pub use manager::{SessionManager, SweepReport};
pub use query::execute as execute_query;
pub use registry::{ConnectionHandle, ConnectionState, Outbound, SessionRegistry};
pub use scheduler::{capture_with_retry, TickScheduler, MAX_CAPTURE_RETRIES};
pub use server::WorldServer;
pub use session::{Session, SessionStore};
pub use validator::{SessionValidator, Validation};
