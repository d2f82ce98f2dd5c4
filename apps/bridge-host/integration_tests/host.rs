use bridge_host::handlers::build_registry;

use bridge_core::client::{BridgeClient, ClientConfig};
use bridge_core::error::BridgeError;
use bridge_core::server::{BridgeServer, EventPublisher};
use bridge_core::transport::memory;

use contract::{
    CMD_DESCRIBE_SCHEMA, CMD_START_JOB, CMD_SUM, JobError, JobStarted, MathError, NoArgs,
    ProgressEvent, SchemaInfo, StartJobArgs, SumArgs, TOPIC_PROGRESS,
};

use futures_util::StreamExt;

// ============================================================================
// Integration tests for the host's handlers behind a real bridge
// The UI side is a BridgeClient on the other end of an in-memory link
// ============================================================================

async fn connect_host() -> BridgeClient {
    let schema = contract::schema().unwrap();
    let publisher = EventPublisher::new(schema.clone());
    let registry = build_registry(schema.clone(), &publisher).unwrap();
    let server = BridgeServer::new(registry, publisher).unwrap();

    let (ui, backend) = memory::pair();
    tokio::spawn(async move { server.serve(backend).await });

    BridgeClient::connect(ui, schema, ClientConfig::default())
        .await
        .unwrap()
}

/// **VALUE**: Tests that a started job reports progress to subscribers up to
/// 100 percent, tagged with the id the call returned.
///
/// **WHY THIS MATTERS**: This is the command-plus-events flow a UI relies on:
/// the reply arrives first and progress follows on the shared topic.
///
/// **BUG THIS CATCHES**: Would catch the job publishing through a publisher
/// that is not attached to the server, so events never reach any link.
#[tokio::test(start_paused = true)]
async fn given_subscriber_when_starting_job_then_progress_reaches_100() {
    // GIVEN: A connected UI subscribed to progress
    let client = connect_host().await;
    let mut progress = client
        .subscribe::<ProgressEvent>(TOPIC_PROGRESS)
        .await
        .unwrap();

    // WHEN: Starting a three step job
    let args = StartJobArgs::builder()
        .with_steps(3)
        .with_label("import")
        .build()
        .unwrap();
    let started: JobStarted = client.call(CMD_START_JOB, &args).await.unwrap();

    // THEN: Three events arrive in order for that job
    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = progress.next().await.unwrap().unwrap();
        assert_eq!(event.job_id.as_deref(), Some(started.job_id.as_str()));
        seen.push(event.pct);
    }
    assert_eq!(seen, vec![33, 66, 100]);
}

/// **VALUE**: Tests that the handler's validation error reaches the UI typed.
#[tokio::test]
async fn given_too_many_steps_when_starting_job_then_invalid_request() {
    let client = connect_host().await;

    let result = client
        .call::<_, JobStarted>(
            CMD_START_JOB,
            &StartJobArgs {
                steps: 1_000_000,
                label: None,
            },
        )
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, BridgeError::HandlerError { .. }), "{err}");
    assert!(matches!(
        err.handler_error_as::<JobError>(),
        Some(JobError::InvalidRequest { .. })
    ));
}

/// **VALUE**: Tests that sum and its overflow error work against the contract schema.
#[tokio::test]
async fn given_contract_host_when_summing_then_result_or_overflow() {
    let client = connect_host().await;

    let five: i64 = client.call(CMD_SUM, &SumArgs { a: 2, b: 3 }).await.unwrap();
    let overflow = client
        .call::<_, i64>(CMD_SUM, &SumArgs { a: i64::MAX, b: 1 })
        .await
        .unwrap_err();

    assert_eq!(five, 5);
    assert_eq!(
        overflow.handler_error_as::<MathError>(),
        Some(MathError::Overflow)
    );
}

/// **VALUE**: Tests that the UI can read the backend's schema description and
/// that it matches the schema the UI loaded itself.
#[tokio::test]
async fn given_contract_host_when_describing_schema_then_matches_local_schema() {
    let client = connect_host().await;

    let info: SchemaInfo = client.call(CMD_DESCRIBE_SCHEMA, &NoArgs {}).await.unwrap();

    assert_eq!(info.fingerprint, client.schema().fingerprint());
    assert_eq!(info.commands.len(), client.schema().commands().count());
}
