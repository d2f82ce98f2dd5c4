// Unit tests for error module
// Host errors are logged as structured JSON, so they must serialize

use crate::error::HostError;

use bridge_core::error::ConfigError;

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Tests that host errors serialize with their variant tag.
///
/// **BUG THIS CATCHES**: Would catch a non-serializable field being added to
/// the error, or the `tag`/`content` attributes being dropped.
#[test]
fn given_host_error_when_serialized_then_tagged_json() {
    // GIVEN: A HostError
    let err = HostError::Host {
        message: String::from("Test"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Serializing to JSON
    let json = serde_json::to_value(&err).unwrap();

    // THEN: Variant name and message are present
    assert_eq!(json["type"], "Host");
    assert_eq!(json["data"]["message"], "Test");
}

/// **VALUE**: Tests that configuration failures keep their own variant.
#[test]
fn given_config_error_when_converted_then_config_variant() {
    let source = ConfigError::ValidationError {
        reason: String::from("calls.timeout_ms must be greater than zero"),
        location: ErrorLocation::from(Location::caller()),
    };

    let err = HostError::from(source);

    match err {
        HostError::Config { message, .. } => assert!(message.contains("timeout_ms")),
        other => panic!("expected Config, got {other:?}"),
    }
}
