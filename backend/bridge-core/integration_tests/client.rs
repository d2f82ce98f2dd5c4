// Invocation client against a scripted backend: correlation, at-most-once
// settlement, cancellation and malformed traffic

use crate::helpers::{
    Progress, SlowOpArgs, SumArgs, start_scripted_bridge, test_config, wait_until,
};

use bridge_core::client::{BridgeClient, ClientConfig};
use bridge_core::envelope::{Envelope, EnvelopeKind, WireError};
use bridge_core::error::BridgeError;
use bridge_core::transport::memory;

use std::time::Duration;

use futures_util::StreamExt;

// ============================================
// CORRELATION
// ============================================

/// **VALUE**: Verifies a call settles exactly once even when the backend
/// answers twice, and that answers for unknown ids are only counted.
///
/// **WHY THIS MATTERS**: A duplicated or stale Result must never resolve some
/// other call or crash the client.
///
/// **BUG THIS CATCHES**: Would catch the pending entry not being removed on
/// settlement, or stray ids panicking the actor.
#[tokio::test]
async fn given_duplicate_and_stale_results_when_received_then_call_settles_once() {
    // GIVEN
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, i64>("sum", &SumArgs { a: 2, b: 3 })
        .unwrap();
    let (id, call) = backend.next_call().await;
    assert_eq!(call.command.as_deref(), Some("sum"));

    // WHEN
    backend.to_ui.send(Envelope::result(id, b"5".to_vec())).unwrap();
    backend.to_ui.send(Envelope::result(id, b"6".to_vec())).unwrap();
    backend.to_ui.send(Envelope::result(999, b"7".to_vec())).unwrap();

    // THEN
    assert_eq!(pending.await.unwrap(), 5);
    wait_until(|| client.diagnostics().unmatched_envelopes == 2).await;
    assert!(client.pending_calls().await.is_empty());
}

/// **VALUE**: Verifies responses are matched by id, not by arrival order.
#[tokio::test]
async fn given_two_calls_when_answered_in_reverse_then_each_gets_its_own_result() {
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let first = client
        .invoke::<_, i64>("sum", &SumArgs { a: 1, b: 1 })
        .unwrap();
    let second = client
        .invoke::<_, i64>("sum", &SumArgs { a: 10, b: 10 })
        .unwrap();
    let (first_id, _) = backend.next_call().await;
    let (second_id, _) = backend.next_call().await;
    assert_ne!(first_id, second_id);

    backend
        .to_ui
        .send(Envelope::result(second_id, b"20".to_vec()))
        .unwrap();
    backend
        .to_ui
        .send(Envelope::result(first_id, b"2".to_vec()))
        .unwrap();

    assert_eq!(second.await.unwrap(), 20);
    assert_eq!(first.await.unwrap(), 2);
}

/// **VALUE**: Verifies a response arriving after the call timed out is
/// discarded and counted.
///
/// **BUG THIS CATCHES**: Would catch a timed-out entry lingering in the table
/// and swallowing the late response silently.
#[tokio::test]
async fn given_timed_out_call_when_late_response_arrives_then_counted_as_unmatched() {
    // GIVEN
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke_with_timeout::<_, ()>("slow_op", &SlowOpArgs { millis: 1 }, Duration::from_millis(50))
        .unwrap();
    let (id, _) = backend.next_call().await;

    // WHEN
    let result = pending.await;

    // THEN
    assert!(matches!(
        result,
        Err(BridgeError::Timeout { timeout_ms: 50, .. })
    ));
    let cancel = backend.next().await;
    assert_eq!(cancel.validate().unwrap(), EnvelopeKind::Cancel);
    assert_eq!(cancel.correlation_id, Some(id));

    backend.to_ui.send(Envelope::result(id, b"null".to_vec())).unwrap();
    wait_until(|| client.diagnostics().unmatched_envelopes == 1).await;
    assert_eq!(client.diagnostics().timeouts, 1);
}

// ============================================
// CANCELLATION
// ============================================

/// **VALUE**: Verifies dropping an unsettled call sends a Cancel carrying the
/// same correlation id.
///
/// **WHY THIS MATTERS**: A UI that navigates away must release the backend's
/// work, not leave it running until the timeout.
#[tokio::test]
async fn given_pending_call_when_dropped_then_backend_receives_cancel() {
    // GIVEN
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 60_000 })
        .unwrap();
    let (id, _) = backend.next_call().await;

    // WHEN
    drop(pending);

    // THEN
    let cancel = backend.next().await;
    assert_eq!(cancel.validate().unwrap(), EnvelopeKind::Cancel);
    assert_eq!(cancel.correlation_id, Some(id));
    assert!(client.pending_calls().await.is_empty());
    assert_eq!(client.diagnostics().cancelled, 1);
}

/// **VALUE**: Verifies a settled call sends no Cancel when dropped.
#[tokio::test]
async fn given_settled_call_when_dropped_then_no_cancel_is_sent() {
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, i64>("sum", &SumArgs { a: 1, b: 2 })
        .unwrap();
    let (id, _) = backend.next_call().await;
    backend.to_ui.send(Envelope::result(id, b"3".to_vec())).unwrap();

    assert_eq!(pending.await.unwrap(), 3);
    assert!(client.pending_calls().await.is_empty());

    assert!(backend.from_ui.try_recv().is_err());
    assert_eq!(client.diagnostics().cancelled, 0);
}

// ============================================
// LOCAL VALIDATION
// ============================================

/// **VALUE**: Verifies local validation failures never reach the backend.
#[tokio::test]
async fn given_invalid_calls_when_invoked_then_nothing_is_sent() {
    let (client, mut backend) = start_scripted_bridge(test_config()).await;

    let unknown = client.invoke::<_, ()>("multiply", &SumArgs { a: 1, b: 2 });
    let mismatched = client.invoke::<_, i64>("sum", &serde_json::json!({"a": 1}));

    assert!(matches!(unknown, Err(BridgeError::UnknownCommand { .. })));
    assert!(matches!(
        mismatched,
        Err(BridgeError::SchemaMismatch { ref path, .. }) if path == "$.b"
    ));
    assert!(client.pending_calls().await.is_empty());
    assert!(backend.from_ui.try_recv().is_err());
}

// ============================================
// ERRORS FROM THE BACKEND
// ============================================

/// **VALUE**: Verifies wire errors map back to the matching bridge errors.
#[tokio::test]
async fn given_panicked_error_envelope_when_received_then_handler_panicked() {
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, i64>("sum", &SumArgs { a: 1, b: 2 })
        .unwrap();
    let (id, _) = backend.next_call().await;

    backend
        .to_ui
        .send(Envelope::error(
            id,
            &WireError::HandlerPanicked {
                message: "boom".to_string(),
            },
        ))
        .unwrap();

    match pending.await {
        Err(BridgeError::HandlerPanicked { command, message, .. }) => {
            assert_eq!(command, "sum");
            assert_eq!(message, "boom");
        }
        other => panic!("expected HandlerPanicked, got {other:?}"),
    }
}

/// **VALUE**: Verifies a result that does not fit the command's result shape
/// rejects the call instead of handing the caller bad data.
#[tokio::test]
async fn given_result_of_wrong_shape_when_received_then_schema_mismatch() {
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, i64>("sum", &SumArgs { a: 1, b: 2 })
        .unwrap();
    let (id, _) = backend.next_call().await;

    backend
        .to_ui
        .send(Envelope::result(id, br#""three""#.to_vec()))
        .unwrap();

    assert!(matches!(
        pending.await,
        Err(BridgeError::SchemaMismatch { .. })
    ));
}

// ============================================
// MALFORMED TRAFFIC
// ============================================

/// **VALUE**: Verifies malformed envelopes and bad event payloads are dropped
/// and counted while good traffic keeps flowing.
///
/// **BUG THIS CATCHES**: Would catch a single bad frame ending the
/// subscription or killing the client actor.
#[tokio::test]
async fn given_malformed_traffic_when_received_then_counted_and_stream_continues() {
    // GIVEN
    let (client, backend) = start_scripted_bridge(test_config()).await;
    let mut progress = client.subscribe::<Progress>("progress").await.unwrap();

    // WHEN
    let mut no_id = Envelope::result(1, b"1".to_vec());
    no_id.correlation_id = None;
    backend.to_ui.send(no_id).unwrap();
    backend
        .to_ui
        .send(Envelope::event("progress", br#"{"pct":-1}"#.to_vec()))
        .unwrap();
    backend
        .to_ui
        .send(Envelope::event("progress", br#"{"pct":10}"#.to_vec()))
        .unwrap();

    // THEN
    let event = progress.next().await.unwrap().unwrap();
    assert_eq!(
        event,
        Progress {
            pct: 10,
            job_id: None
        }
    );
    let diagnostics = client.diagnostics();
    assert_eq!(diagnostics.malformed_envelopes, 1);
    assert_eq!(diagnostics.rejected_events, 1);
}

// ============================================
// HANDSHAKE AND TRANSPORT
// ============================================

/// **VALUE**: Verifies connect gives up when the backend never answers the
/// handshake.
#[tokio::test(start_paused = true)]
async fn given_silent_backend_when_connecting_then_handshake_error() {
    let schema = crate::helpers::demo_schema();
    let (ui, _backend) = memory::pair();

    let result = BridgeClient::connect(
        ui,
        schema,
        ClientConfig {
            handshake_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        },
    )
    .await;

    assert!(matches!(result, Err(BridgeError::Handshake { .. })));
}

/// **VALUE**: Verifies losing the backend fails pending calls and closes the
/// client for good.
#[tokio::test]
async fn given_pending_call_when_backend_drops_then_transport_failure_and_closed() {
    // GIVEN
    let (client, mut backend) = start_scripted_bridge(test_config()).await;
    let pending = client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 60_000 })
        .unwrap();
    backend.next_call().await;

    // WHEN
    drop(backend);

    // THEN
    assert!(matches!(
        pending.await,
        Err(BridgeError::TransportFailure { .. })
    ));
    wait_until(|| client.is_closed()).await;
    assert!(matches!(
        client.call::<_, i64>("sum", &SumArgs { a: 1, b: 2 }).await,
        Err(BridgeError::TransportFailure { .. })
    ));
}
