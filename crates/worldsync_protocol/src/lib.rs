//! # WorldSync Protocol
//!
//! Wire types shared by the WorldSync server and its clients.
//!
//! This crate provides:
//! - The JSON message envelope exchanged over the persistent connection
//! - The entity query language
//! - REST request and response payloads
//! - Connection constants (subprotocol prefix, close codes, routes)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod query;
mod rest;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    parse_client_message, ClientMessage, ErrorKind, HeartbeatSettings, RuntimeConfig,
    ServerMessage, SessionSettings, CLIENT_MESSAGE_TYPES,
};
pub use query::{EntityQuery, QueryResult};
pub use rest::{ApiResponse, HealthData, SessionValidationData};
