//! Wire envelope: one discrete message crossing the process boundary.
//!
//! Envelopes are protobuf frames. The payload is opaque canonical JSON
//! produced by the [marshaller](crate::marshal).
//!
//! ```text
//! message Envelope {
//!   EnvelopeKind kind = 1;
//!   optional uint64 correlation_id = 2;   // CALL, RESULT, ERROR, CANCEL
//!   optional string command = 3;          // CALL
//!   optional string topic = 4;            // EVENT
//!   bytes payload = 5;
//! }
//! ```

use crate::error::bridge::BridgeError;

use prost::Message as ProstMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope kinds. Zero is reserved so an empty frame never validates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EnvelopeKind {
    Unspecified = 0,
    Handshake = 1,
    HandshakeAck = 2,
    Call = 3,
    Result = 4,
    Error = 5,
    Event = 6,
    Cancel = 7,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(enumeration = "EnvelopeKind", tag = "1")]
    pub kind: i32,
    #[prost(uint64, optional, tag = "2")]
    pub correlation_id: Option<u64>,
    #[prost(string, optional, tag = "3")]
    pub command: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub topic: Option<String>,
    #[prost(bytes = "vec", tag = "5")]
    pub payload: Vec<u8>,
}

impl Envelope {
    fn with_kind(kind: EnvelopeKind, payload: Vec<u8>) -> Self {
        Self {
            kind: kind as i32,
            correlation_id: None,
            command: None,
            topic: None,
            payload,
        }
    }

    pub fn handshake(payload: Vec<u8>) -> Self {
        Self::with_kind(EnvelopeKind::Handshake, payload)
    }

    pub fn handshake_ack(payload: Vec<u8>) -> Self {
        Self::with_kind(EnvelopeKind::HandshakeAck, payload)
    }

    pub fn call(correlation_id: u64, command: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            command: Some(command.into()),
            ..Self::with_kind(EnvelopeKind::Call, payload)
        }
    }

    pub fn result(correlation_id: u64, payload: Vec<u8>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Self::with_kind(EnvelopeKind::Result, payload)
        }
    }

    pub fn error(correlation_id: u64, error: &WireError) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Self::with_kind(EnvelopeKind::Error, error.to_payload())
        }
    }

    pub fn event(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::with_kind(EnvelopeKind::Event, payload)
        }
    }

    pub fn cancel(correlation_id: u64) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Self::with_kind(EnvelopeKind::Cancel, Vec::new())
        }
    }

    /// Check the per-kind field rules and return the kind.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedEnvelope`] when the kind is unknown, a
    /// correlation id is missing or present on the wrong kind, or the
    /// command/topic field does not match the kind.
    #[track_caller]
    pub fn validate(&self) -> Result<EnvelopeKind, BridgeError> {
        let kind = EnvelopeKind::try_from(self.kind)
            .ok()
            .filter(|k| *k != EnvelopeKind::Unspecified)
            .ok_or_else(|| BridgeError::malformed(format!("unknown envelope kind {}", self.kind)))?;

        let needs_correlation = matches!(
            kind,
            EnvelopeKind::Call | EnvelopeKind::Result | EnvelopeKind::Error | EnvelopeKind::Cancel
        );
        if needs_correlation != self.correlation_id.is_some() {
            return Err(BridgeError::malformed(format!(
                "{kind:?} envelope {} a correlation id",
                if needs_correlation { "requires" } else { "must not carry" }
            )));
        }
        if (kind == EnvelopeKind::Call) != self.command.is_some() {
            return Err(BridgeError::malformed(format!(
                "command name is only valid on Call envelopes (kind {kind:?})"
            )));
        }
        if (kind == EnvelopeKind::Event) != self.topic.is_some() {
            return Err(BridgeError::malformed(format!(
                "topic is only valid on Event envelopes (kind {kind:?})"
            )));
        }
        Ok(kind)
    }

    /// Protobuf frame for this envelope.
    pub fn to_frame(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Parse a protobuf frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(frame)
    }
}

/// Payload of an Error envelope.
///
/// Serialized adjacently tagged: `{"type": "SchemaMismatch", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireError {
    UnknownCommand { name: String },
    SchemaMismatch { path: String, message: String },
    /// The handler's typed error, in wire form for the command's error shape.
    HandlerError { error: Value },
    HandlerPanicked { message: String },
}

impl WireError {
    pub fn to_payload(&self) -> Vec<u8> {
        // A derived Serialize over strings and JSON values cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    #[track_caller]
    pub fn from_payload(payload: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(payload)
            .map_err(|e| BridgeError::malformed(format!("invalid error payload: {e}")))
    }
}
