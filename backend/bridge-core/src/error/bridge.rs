//! Errors a caller of the bridge can observe.
//!
//! Every variant carries the [`ErrorLocation`] where it was raised. Variants that
//! originate on the backend (`UnknownCommand`, `SchemaMismatch`, `HandlerError`,
//! `HandlerPanicked`) are rebuilt on the UI side from the wire payload, so their
//! location is the point where the client decoded them.

use common::ErrorLocation;

use std::panic::Location;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError)]
pub enum BridgeError {
    #[error("Unknown Command Error: {name} {location}")]
    UnknownCommand {
        name: String,
        location: ErrorLocation,
    },

    #[error("Unknown Topic Error: {topic} {location}")]
    UnknownTopic {
        topic: String,
        location: ErrorLocation,
    },

    #[error("Schema Mismatch Error: {path}: {message} {location}")]
    SchemaMismatch {
        path: String,
        message: String,
        location: ErrorLocation,
    },

    /// Typed error returned by the application handler, passed through verbatim.
    #[error("Handler Error: {command}: {error} {location}")]
    HandlerError {
        command: String,
        error: Value,
        location: ErrorLocation,
    },

    #[error("Handler Panicked Error: {command}: {message} {location}")]
    HandlerPanicked {
        command: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {command} after {timeout_ms} ms {location}")]
    Timeout {
        command: String,
        timeout_ms: u64,
        location: ErrorLocation,
    },

    #[error("Cancelled Error: {command} {location}")]
    Cancelled {
        command: String,
        location: ErrorLocation,
    },

    #[error("Duplicate Command Error: {name} {location}")]
    DuplicateCommand {
        name: String,
        location: ErrorLocation,
    },

    #[error("Missing Handler Error: {name} {location}")]
    MissingHandler {
        name: String,
        location: ErrorLocation,
    },

    #[error("Transport Failure Error: {message} {location}")]
    TransportFailure {
        message: String,
        location: ErrorLocation,
    },

    #[error("Schema Version Mismatch Error: local {local}, remote {remote} {location}")]
    SchemaVersionMismatch {
        local: String,
        remote: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Malformed Envelope Error: {message} {location}")]
    MalformedEnvelope {
        message: String,
        location: ErrorLocation,
    },
}

impl BridgeError {
    #[track_caller]
    pub(crate) fn schema_mismatch(path: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::SchemaMismatch {
            path: path.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub(crate) fn transport_failure(message: impl Into<String>) -> Self {
        BridgeError::TransportFailure {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        BridgeError::MalformedEnvelope {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Decode the handler's typed error, if this is a `HandlerError`.
    ///
    /// Returns `None` for every other variant or when `E` does not match the
    /// error value.
    pub fn handler_error_as<E: DeserializeOwned>(&self) -> Option<E> {
        match self {
            BridgeError::HandlerError { error, .. } => serde_json::from_value(error.clone()).ok(),
            _ => None,
        }
    }
}
