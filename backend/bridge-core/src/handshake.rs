//! Initial exchange that gates a link.
//!
//! The UI side opens every link with a `Handshake` envelope carrying its
//! protocol version, its [`SchemaToken`] and (optionally) the auth token. The
//! backend answers with `HandshakeAck`. Nothing else is accepted before a
//! successful handshake, and a mismatch on either side is fatal: the bridge
//! never becomes operational.

use crate::PROTOCOL_VERSION;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::bridge::BridgeError;
use crate::schema::SchemaToken;

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub protocol_version: u32,
    pub schema: SchemaToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAck {
    pub accepted: bool,
    pub protocol_version: u32,
    pub schema: SchemaToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Hello {
    pub fn new(schema: SchemaToken, auth_token: Option<&RedactedToken>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            schema,
            auth_token: auth_token.map(|t| t.as_str().to_string()),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::handshake(serde_json::to_vec(self).unwrap_or_default())
    }

    #[track_caller]
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, BridgeError> {
        expect_kind(envelope, EnvelopeKind::Handshake)?;
        serde_json::from_slice(&envelope.payload).map_err(|e| BridgeError::Handshake {
            message: format!("invalid handshake payload: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

impl HelloAck {
    pub fn to_envelope(&self) -> Envelope {
        Envelope::handshake_ack(serde_json::to_vec(self).unwrap_or_default())
    }

    #[track_caller]
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, BridgeError> {
        expect_kind(envelope, EnvelopeKind::HandshakeAck)?;
        serde_json::from_slice(&envelope.payload).map_err(|e| BridgeError::Handshake {
            message: format!("invalid handshake acknowledgement: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

/// Backend-side verdict on a [`Hello`].
///
/// Returns the acknowledgement to send back and, when the link must be
/// rejected, the error the backend reports locally.
pub fn evaluate(
    hello: &Hello,
    local: &SchemaToken,
    expected_token: Option<&RedactedToken>,
) -> (HelloAck, Option<BridgeError>) {
    let rejection = check(hello, local, expected_token).err();
    let ack = HelloAck {
        accepted: rejection.is_none(),
        protocol_version: PROTOCOL_VERSION,
        schema: local.clone(),
        reason: rejection.as_ref().map(reason_for),
    };
    (ack, rejection)
}

/// UI-side check of the backend's acknowledgement.
#[track_caller]
pub fn verify_ack(ack: &HelloAck, local: &SchemaToken) -> Result<(), BridgeError> {
    if !ack.accepted {
        let reason = ack
            .reason
            .clone()
            .unwrap_or_else(|| String::from("rejected without reason"));
        if ack.schema != *local {
            return Err(BridgeError::SchemaVersionMismatch {
                local: local.to_string(),
                remote: ack.schema.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        return Err(BridgeError::Handshake {
            message: format!("backend rejected handshake: {reason}"),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    if ack.protocol_version != PROTOCOL_VERSION || ack.schema != *local {
        return Err(BridgeError::SchemaVersionMismatch {
            local: format!("{local} (protocol {PROTOCOL_VERSION})"),
            remote: format!("{} (protocol {})", ack.schema, ack.protocol_version),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(())
}

#[track_caller]
fn check(
    hello: &Hello,
    local: &SchemaToken,
    expected_token: Option<&RedactedToken>,
) -> Result<(), BridgeError> {
    if let Some(expected) = expected_token {
        let presented = hello.auth_token.as_deref().unwrap_or_default();
        if !expected.matches(presented) {
            return Err(BridgeError::Handshake {
                message: String::from("invalid authentication token"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    }
    if hello.protocol_version != PROTOCOL_VERSION || hello.schema != *local {
        return Err(BridgeError::SchemaVersionMismatch {
            local: format!("{local} (protocol {PROTOCOL_VERSION})"),
            remote: format!("{} (protocol {})", hello.schema, hello.protocol_version),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(())
}

fn reason_for(error: &BridgeError) -> String {
    match error {
        BridgeError::Handshake { message, .. } => message.clone(),
        BridgeError::SchemaVersionMismatch { local, remote, .. } => {
            format!("schema mismatch: backend {local}, ui {remote}")
        }
        other => other.to_string(),
    }
}

#[track_caller]
fn expect_kind(envelope: &Envelope, expected: EnvelopeKind) -> Result<(), BridgeError> {
    let kind = envelope.validate()?;
    if kind != expected {
        return Err(BridgeError::Handshake {
            message: format!("expected {expected:?} envelope, received {kind:?}"),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(())
}
