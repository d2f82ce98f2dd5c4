//! Shared building blocks for the IPC bridge workspace.
//!
//! This crate carries the pieces every other member depends on:
//!
//! - **[`ErrorLocation`]**: where an error was raised, attached to every error variant
//! - **[`RedactedToken`]**: the handshake auth token, never printed and zeroized on drop
//!
//! ## Architecture
//!
//! - **common** (this crate): error plumbing and secret handling
//! - **bridge-core**: the IPC contract layer (schema, marshalling, dispatch, calls, events)
//! - **contract**: the application's shared schema artifact
//! - **bridge-host**: the backend process wiring everything together

pub mod error;
pub mod redacted_token;

#[cfg(test)]
mod tests;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_token::RedactedToken;
