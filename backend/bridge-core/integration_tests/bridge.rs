// End-to-end tests: a real BridgeServer and BridgeClient over an in-memory link

use crate::helpers::{
    MathError, Progress, SlowOpArgs, SumArgs, TEST_CALL_TIMEOUT, demo_schema, demo_server,
    start_memory_bridge, test_config,
};

use bridge_core::client::BridgeClient;
use bridge_core::error::BridgeError;
use bridge_core::schema::{CommandSpec, Schema};
use bridge_core::transport::memory;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;

// ============================================
// CALLS
// ============================================

/// **VALUE**: Verifies the basic call path: `sum({a:2,b:3})` resolves to `5`.
///
/// **WHY THIS MATTERS**: This is the control flow every command follows: encode,
/// transmit, dispatch, encode result, resolve.
///
/// **BUG THIS CATCHES**: Would catch any break in the chain, e.g. correlation ids
/// not being echoed or results encoded against the wrong shape.
#[tokio::test]
async fn given_connected_bridge_when_calling_sum_then_resolves_to_five() {
    // GIVEN
    let bridge = start_memory_bridge().await;

    // WHEN
    let result: i64 = bridge
        .client
        .call("sum", &SumArgs { a: 2, b: 3 })
        .await
        .unwrap();

    // THEN
    assert_eq!(result, 5);
    assert!(bridge.client.pending_calls().await.is_empty());
}

/// **VALUE**: Verifies arguments that do not fit the schema fail with
/// `SchemaMismatch` before anything is sent.
///
/// **WHY THIS MATTERS**: `sum({a:"x",b:3})` must never reach the handler.
#[tokio::test]
async fn given_string_argument_when_calling_sum_then_schema_mismatch() {
    let bridge = start_memory_bridge().await;

    let result = bridge
        .client
        .call::<_, i64>("sum", &json!({"a": "x", "b": 3}))
        .await;

    match result {
        Err(BridgeError::SchemaMismatch { path, .. }) => assert_eq!(path, "$.a"),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

/// **VALUE**: Verifies an unregistered command fails locally with
/// `UnknownCommand`.
#[tokio::test]
async fn given_unknown_command_when_calling_then_unknown_command() {
    let bridge = start_memory_bridge().await;

    let result = bridge.client.call::<_, ()>("multiply", &json!({})).await;

    assert!(matches!(
        result,
        Err(BridgeError::UnknownCommand { ref name, .. }) if name == "multiply"
    ));
    assert!(bridge.client.pending_calls().await.is_empty());
}

/// **VALUE**: Verifies the handler's typed error reaches the caller intact.
///
/// **WHY THIS MATTERS**: `HandlerError` is never swallowed or flattened; UI code
/// matches on the typed error.
///
/// **BUG THIS CATCHES**: Would catch wide-integer arguments being rounded (the
/// overflow would not happen) or the error payload losing its tag.
#[tokio::test]
async fn given_overflowing_arguments_when_calling_sum_then_typed_handler_error() {
    let bridge = start_memory_bridge().await;

    let result = bridge
        .client
        .call::<_, i64>("sum", &SumArgs { a: i64::MAX, b: 1 })
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, BridgeError::HandlerError { ref command, .. } if command == "sum"));
    assert_eq!(error.handler_error_as::<MathError>(), Some(MathError::Overflow));
}

/// **VALUE**: Verifies wide integers cross the boundary exactly.
#[tokio::test]
async fn given_wide_integers_when_calling_sum_then_exact_result() {
    let bridge = start_memory_bridge().await;

    let result: i64 = bridge
        .client
        .call("sum", &SumArgs { a: i64::MAX - 10, b: 3 })
        .await
        .unwrap();

    assert_eq!(result, i64::MAX - 7);
}

/// **VALUE**: Verifies a call that never completes times out after the
/// configured window and leaves no pending entry behind.
///
/// **WHY THIS MATTERS**: Without the timeout a lost response would hang the
/// caller forever and leak the pending entry.
///
/// **BUG THIS CATCHES**: Would catch the timer not firing, firing early, or the
/// entry surviving the timeout.
#[tokio::test(start_paused = true)]
async fn given_slow_op_when_timeout_elapses_then_timeout_and_entry_removed() {
    // GIVEN
    let bridge = start_memory_bridge().await;
    let started = tokio::time::Instant::now();

    // WHEN
    let result = bridge
        .client
        .call::<_, ()>("slow_op", &SlowOpArgs { millis: 3_600_000 })
        .await;

    // THEN
    match result {
        Err(BridgeError::Timeout {
            command,
            timeout_ms,
            ..
        }) => {
            assert_eq!(command, "slow_op");
            assert_eq!(timeout_ms, 5000);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(started.elapsed() >= TEST_CALL_TIMEOUT);
    assert!(started.elapsed() < TEST_CALL_TIMEOUT + Duration::from_millis(100));
    assert!(bridge.client.pending_calls().await.is_empty());
    assert_eq!(bridge.client.diagnostics().timeouts, 1);
}

/// **VALUE**: Verifies the per-call timeout override.
#[tokio::test(start_paused = true)]
async fn given_short_override_when_calling_then_times_out_at_override() {
    let bridge = start_memory_bridge().await;

    let result = bridge
        .client
        .call_with_timeout::<_, ()>(
            "slow_op",
            &SlowOpArgs { millis: 1000 },
            Duration::from_millis(200),
        )
        .await;

    assert!(matches!(
        result,
        Err(BridgeError::Timeout { timeout_ms: 200, .. })
    ));
}

/// **VALUE**: Verifies two concurrent calls resolve independently.
///
/// **WHY THIS MATTERS**: A slow handler must not block the link; only
/// per-correlation-id ordering is guaranteed.
///
/// **BUG THIS CATCHES**: Would catch the backend handling calls serially or the
/// client resolving the wrong pending entry.
#[tokio::test(start_paused = true)]
async fn given_slow_and_fast_calls_when_concurrent_then_fast_resolves_first() {
    // GIVEN
    let bridge = start_memory_bridge().await;
    let slow = bridge
        .client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 1000 })
        .unwrap();
    let fast = bridge
        .client
        .invoke::<_, i64>("sum", &SumArgs { a: 20, b: 22 })
        .unwrap();
    assert_ne!(slow.correlation_id(), fast.correlation_id());

    // WHEN
    let started = tokio::time::Instant::now();
    let fast_result = fast.await.unwrap();
    let fast_elapsed = started.elapsed();
    let slow_result = slow.await;

    // THEN
    assert_eq!(fast_result, 42);
    assert!(fast_elapsed < Duration::from_millis(1000));
    assert!(slow_result.is_ok());
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

/// **VALUE**: Verifies an explicit cancel rejects nothing, removes the entry and
/// counts the cancellation.
#[tokio::test(start_paused = true)]
async fn given_pending_call_when_cancelled_then_entry_removed() {
    // GIVEN
    let bridge = start_memory_bridge().await;
    let pending = bridge
        .client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 60_000 })
        .unwrap();
    assert_eq!(bridge.client.pending_calls().await.len(), 1);

    // WHEN
    pending.cancel();

    // THEN
    assert!(bridge.client.pending_calls().await.is_empty());
    assert_eq!(bridge.client.diagnostics().cancelled, 1);
}

/// **VALUE**: Verifies losing the transport rejects every pending call with
/// `TransportFailure` and fails later calls immediately.
///
/// **WHY THIS MATTERS**: There is no reconnect; callers must learn the bridge is
/// gone instead of waiting for their timeouts.
#[tokio::test(start_paused = true)]
async fn given_pending_calls_when_backend_goes_away_then_transport_failure() {
    // GIVEN
    let bridge = start_memory_bridge().await;
    let first = bridge
        .client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 60_000 })
        .unwrap();
    let second = bridge
        .client
        .invoke::<_, ()>("slow_op", &SlowOpArgs { millis: 60_000 })
        .unwrap();
    let mut progress = bridge.client.subscribe::<Progress>("progress").await.unwrap();

    // WHEN
    bridge.server_task.abort();

    // THEN
    assert!(matches!(first.await, Err(BridgeError::TransportFailure { .. })));
    assert!(matches!(second.await, Err(BridgeError::TransportFailure { .. })));
    assert!(progress.next().await.is_none());
    assert!(matches!(
        bridge.client.call::<_, i64>("sum", &SumArgs { a: 1, b: 1 }).await,
        Err(BridgeError::TransportFailure { .. })
    ));
}

// ============================================
// EVENTS
// ============================================

/// **VALUE**: Verifies subscribe, deliver, unsubscribe: a payload published
/// after unsubscribing is never observed by that subscription.
///
/// **WHY THIS MATTERS**: Unsubscribe takes effect once it returns; a second
/// subscriber shows the event itself still flowed.
///
/// **BUG THIS CATCHES**: Would catch unsubscribe not removing the sink, or
/// removing every subscriber of the topic.
#[tokio::test]
async fn given_progress_subscription_when_publishing_then_delivered_until_unsubscribed() {
    // GIVEN
    let bridge = start_memory_bridge().await;
    let mut first = bridge.client.subscribe::<Progress>("progress").await.unwrap();
    let mut second = bridge.client.subscribe::<Progress>("progress").await.unwrap();

    // WHEN
    let links = bridge
        .publisher
        .publish("progress", &json!({"pct": 50}))
        .await
        .unwrap();

    // THEN
    assert_eq!(links, 1);
    let expected = Progress {
        pct: 50,
        job_id: None,
    };
    assert_eq!(first.next().await.unwrap().unwrap(), expected);
    assert_eq!(second.next().await.unwrap().unwrap(), expected);

    // WHEN
    first.unsubscribe().await;
    bridge
        .publisher
        .publish(
            "progress",
            &Progress {
                pct: 60,
                job_id: Some("job-1".to_string()),
            },
        )
        .await
        .unwrap();

    // THEN
    let delivered = second.next().await.unwrap().unwrap();
    assert_eq!(delivered.pct, 60);
    assert_eq!(delivered.job_id.as_deref(), Some("job-1"));
}

/// **VALUE**: Verifies publishing validates the topic and payload shape.
#[tokio::test]
async fn given_bad_topic_or_payload_when_publishing_then_rejected() {
    let bridge = start_memory_bridge().await;

    let unknown = bridge.publisher.publish("progres", &json!({"pct": 1})).await;
    let mismatch = bridge.publisher.publish("progress", &json!({"pct": -1})).await;

    assert!(matches!(unknown, Err(BridgeError::UnknownTopic { .. })));
    assert!(matches!(mismatch, Err(BridgeError::SchemaMismatch { .. })));
}

/// **VALUE**: Verifies publishing with nobody listening is a no-op.
#[tokio::test]
async fn given_no_links_when_publishing_then_zero_deliveries() {
    let server = demo_server(demo_schema());

    let delivered = server
        .publisher()
        .publish("progress", &json!({"pct": 10}))
        .await
        .unwrap();

    assert_eq!(delivered, 0);
    assert_eq!(server.publisher().connection_count().await, 0);
}

/// **VALUE**: Verifies subscribing to an undeclared topic fails locally.
#[tokio::test]
async fn given_unknown_topic_when_subscribing_then_unknown_topic() {
    let bridge = start_memory_bridge().await;

    let result = bridge.client.subscribe::<Progress>("progres").await;

    assert!(matches!(result, Err(BridgeError::UnknownTopic { .. })));
}

// ============================================
// HANDSHAKE
// ============================================

/// **VALUE**: Verifies divergent schemas stop the bridge on both sides.
///
/// **WHY THIS MATTERS**: Startup schema mismatch is fatal; a half-working bridge
/// would fail later with confusing decode errors.
///
/// **BUG THIS CATCHES**: Would catch either side ignoring the handshake verdict.
#[tokio::test]
async fn given_divergent_schemas_when_connecting_then_both_sides_fail() {
    // GIVEN
    let server = demo_server(demo_schema());
    let ui_schema = Arc::new(
        Schema::builder("demo", 1)
            .command(CommandSpec::new("sum"))
            .build()
            .unwrap(),
    );
    let (ui, backend) = memory::pair();
    let server_task = tokio::spawn(async move { server.serve(backend).await });

    // WHEN
    let client = BridgeClient::connect(ui, ui_schema, test_config()).await;

    // THEN
    assert!(matches!(
        client,
        Err(BridgeError::SchemaVersionMismatch { .. })
    ));
    assert!(matches!(
        server_task.await.unwrap(),
        Err(BridgeError::SchemaVersionMismatch { .. })
    ));
}
