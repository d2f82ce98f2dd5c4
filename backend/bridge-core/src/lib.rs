//! Typed IPC command/event bridge between a UI process and a native backend.
//!
//! ## Modules
//!
//! - [`schema`]: the shared schema both processes load
//! - [`marshal`]: lossless, shape-checked conversion to and from the wire
//! - [`envelope`]: the protobuf frame crossing the boundary
//! - [`handshake`]: protocol/schema agreement before anything else flows
//! - [`registry`]: backend command handlers and dispatch
//! - [`server`]: backend link driver and event publisher
//! - [`client`]: UI-side calls and event subscriptions
//! - [`transport`]: in-memory and WebSocket links
//! - [`config`]: `bridge.toml` with environment overrides

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod marshal;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;

#[cfg(test)]
mod tests;

/// Wire protocol version exchanged in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

pub const IPC_HOSTNAME: &str = "127.0.0.1";
pub const IPC_URL_PREFIX: &str = const_format::concatcp!("ws://", IPC_HOSTNAME);
