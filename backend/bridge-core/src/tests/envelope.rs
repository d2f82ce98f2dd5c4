// Unit tests for the wire envelope and error payloads

use crate::envelope::{Envelope, EnvelopeKind, WireError};
use crate::error::BridgeError;

use serde_json::json;

fn is_malformed(result: Result<EnvelopeKind, BridgeError>) -> bool {
    matches!(result, Err(BridgeError::MalformedEnvelope { .. }))
}

/// **VALUE**: Verifies every constructor produces an envelope that validates as
/// its own kind and survives the protobuf frame.
///
/// **WHY THIS MATTERS**: Both sides build envelopes through these constructors;
/// one that fails its own validation would be discarded by the peer.
///
/// **BUG THIS CATCHES**: Would catch a constructor forgetting the correlation id
/// or a tag number drifting in the frame layout.
#[test]
fn given_constructed_envelopes_when_framing_then_valid_and_identical() {
    let cases = [
        (Envelope::handshake(b"{}".to_vec()), EnvelopeKind::Handshake),
        (Envelope::handshake_ack(b"{}".to_vec()), EnvelopeKind::HandshakeAck),
        (Envelope::call(7, "sum", br#"{"a":2,"b":3}"#.to_vec()), EnvelopeKind::Call),
        (Envelope::result(7, b"5".to_vec()), EnvelopeKind::Result),
        (
            Envelope::error(7, &WireError::UnknownCommand { name: "x".to_string() }),
            EnvelopeKind::Error,
        ),
        (Envelope::event("progress", br#"{"pct":50}"#.to_vec()), EnvelopeKind::Event),
        (Envelope::cancel(7), EnvelopeKind::Cancel),
    ];

    for (envelope, kind) in cases {
        let framed = Envelope::from_frame(&envelope.to_frame()).unwrap();
        assert_eq!(framed, envelope);
        assert_eq!(framed.validate().unwrap(), kind);
    }
}

/// **VALUE**: Verifies the per-kind field rules.
///
/// **WHY THIS MATTERS**: A Result without a correlation id could never be
/// matched; an Event with one could be mistaken for a response.
///
/// **BUG THIS CATCHES**: Would catch validation that only checks the kind.
#[test]
fn given_envelopes_breaking_field_rules_when_validating_then_malformed() {
    let mut call_without_id = Envelope::call(1, "sum", Vec::new());
    call_without_id.correlation_id = None;

    let mut call_without_command = Envelope::call(1, "sum", Vec::new());
    call_without_command.command = None;

    let mut event_with_id = Envelope::event("progress", Vec::new());
    event_with_id.correlation_id = Some(3);

    let mut result_with_topic = Envelope::result(1, Vec::new());
    result_with_topic.topic = Some("progress".to_string());

    let mut unspecified = Envelope::cancel(1);
    unspecified.kind = EnvelopeKind::Unspecified as i32;

    let mut unknown_kind = Envelope::cancel(1);
    unknown_kind.kind = 42;

    for envelope in [
        call_without_id,
        call_without_command,
        event_with_id,
        result_with_topic,
        unspecified,
        unknown_kind,
    ] {
        assert!(is_malformed(envelope.validate()), "{envelope:?} validated");
    }
}

/// **VALUE**: Verifies corrupt frames are rejected rather than decoded as defaults.
#[test]
fn given_truncated_frame_when_decoding_then_error() {
    assert!(Envelope::from_frame(&[0xff, 0xff, 0xff]).is_err());
}

/// **VALUE**: Verifies error payloads use the adjacently tagged form.
///
/// **WHY THIS MATTERS**: A UI in another language matches on `type` and reads
/// `data`; the shape is part of the wire contract.
///
/// **BUG THIS CATCHES**: Would catch a serde attribute change that alters the
/// payload layout.
#[test]
fn given_wire_error_when_serializing_then_adjacently_tagged() {
    let error = WireError::HandlerError {
        error: json!({"type": "Overflow"}),
    };

    let payload: serde_json::Value = serde_json::from_slice(&error.to_payload()).unwrap();

    assert_eq!(
        payload,
        json!({"type": "HandlerError", "data": {"error": {"type": "Overflow"}}})
    );
    assert_eq!(WireError::from_payload(&error.to_payload()).unwrap(), error);
}

/// **VALUE**: Verifies an unreadable error payload is reported as malformed.
#[test]
fn given_garbage_error_payload_when_decoding_then_malformed() {
    assert!(matches!(
        WireError::from_payload(b"not json"),
        Err(BridgeError::MalformedEnvelope { .. })
    ));
}
