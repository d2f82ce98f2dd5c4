// Unit tests for the handshake verdicts on both sides

use crate::PROTOCOL_VERSION;
use crate::error::BridgeError;
use crate::handshake::{self, Hello, HelloAck};
use crate::schema::{CommandSpec, Schema, SchemaToken};
use crate::tests::fixtures::demo_schema;

use common::RedactedToken;

fn other_token() -> SchemaToken {
    Schema::builder("demo", 1)
        .command(CommandSpec::new("sum"))
        .build()
        .unwrap()
        .token()
}

/// **VALUE**: Verifies identical schemas and protocol versions are accepted.
#[test]
fn given_matching_hello_when_evaluating_then_accepted_and_ack_verifies() {
    // GIVEN
    let local = demo_schema().token();
    let hello = Hello::new(local.clone(), None);

    // WHEN
    let (ack, rejection) = handshake::evaluate(&hello, &local, None);

    // THEN
    assert!(rejection.is_none());
    assert!(ack.accepted);
    assert_eq!(ack.protocol_version, PROTOCOL_VERSION);
    assert!(handshake::verify_ack(&ack, &local).is_ok());
}

/// **VALUE**: Verifies a schema fingerprint difference is fatal on both sides.
///
/// **WHY THIS MATTERS**: Divergent schemas must fail at startup, not as silent
/// runtime decode errors.
///
/// **BUG THIS CATCHES**: Would catch comparing only name and version.
#[test]
fn given_different_fingerprint_when_handshaking_then_schema_version_mismatch_both_sides() {
    // GIVEN
    let backend = demo_schema().token();
    let ui = other_token();
    assert_eq!(backend.name, ui.name);
    assert_eq!(backend.version, ui.version);

    // WHEN
    let (ack, rejection) = handshake::evaluate(&Hello::new(ui.clone(), None), &backend, None);

    // THEN
    assert!(!ack.accepted);
    assert!(ack.reason.is_some());
    assert!(matches!(
        rejection,
        Some(BridgeError::SchemaVersionMismatch { .. })
    ));
    assert!(matches!(
        handshake::verify_ack(&ack, &ui),
        Err(BridgeError::SchemaVersionMismatch { .. })
    ));
}

/// **VALUE**: Verifies a protocol version difference is rejected even when the
/// schemas agree.
#[test]
fn given_other_protocol_version_when_evaluating_then_rejected() {
    let local = demo_schema().token();
    let mut hello = Hello::new(local.clone(), None);
    hello.protocol_version = PROTOCOL_VERSION + 1;

    let (ack, rejection) = handshake::evaluate(&hello, &local, None);

    assert!(!ack.accepted);
    assert!(matches!(
        rejection,
        Some(BridgeError::SchemaVersionMismatch { .. })
    ));
    assert!(matches!(
        handshake::verify_ack(&ack, &local),
        Err(BridgeError::Handshake { .. })
    ));
}

/// **VALUE**: Verifies the auth token gate.
///
/// **WHY THIS MATTERS**: Any local process can open the loopback port; the
/// token keeps them out.
///
/// **BUG THIS CATCHES**: Would catch a missing token being treated as a match.
#[test]
fn given_required_token_when_evaluating_then_only_matching_token_accepted() {
    let local = demo_schema().token();
    let expected = RedactedToken::new("s3cret");

    let (missing, _) = handshake::evaluate(&Hello::new(local.clone(), None), &local, Some(&expected));
    let wrong_token = RedactedToken::new("guess");
    let (wrong, _) = handshake::evaluate(
        &Hello::new(local.clone(), Some(&wrong_token)),
        &local,
        Some(&expected),
    );
    let (right, rejection) = handshake::evaluate(
        &Hello::new(local.clone(), Some(&expected)),
        &local,
        Some(&expected),
    );

    assert!(!missing.accepted);
    assert!(!wrong.accepted);
    assert!(right.accepted);
    assert!(rejection.is_none());
}

/// **VALUE**: Verifies handshake payloads round-trip through envelopes and
/// that the wrong envelope kind is refused.
#[test]
fn given_handshake_envelopes_when_parsing_then_kinds_enforced() {
    let local = demo_schema().token();
    let hello = Hello::new(local.clone(), None);
    let ack = HelloAck {
        accepted: true,
        protocol_version: PROTOCOL_VERSION,
        schema: local,
        reason: None,
    };

    assert_eq!(Hello::from_envelope(&hello.to_envelope()).unwrap(), hello);
    assert_eq!(HelloAck::from_envelope(&ack.to_envelope()).unwrap(), ack);
    assert!(matches!(
        Hello::from_envelope(&ack.to_envelope()),
        Err(BridgeError::Handshake { .. })
    ));
}

/// **VALUE**: Verifies an absent auth token is omitted from the payload.
#[test]
fn given_hello_without_token_when_serializing_then_field_omitted() {
    let hello = Hello::new(demo_schema().token(), None);

    let json = serde_json::to_value(&hello).unwrap();

    assert!(json.get("auth_token").is_none());
}
