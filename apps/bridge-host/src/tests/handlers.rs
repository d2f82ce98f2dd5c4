// Unit tests for the contract command handlers

use crate::handlers::{build_registry, schema_info, start_job, sum};

use bridge_core::server::EventPublisher;

use contract::{CMD_DESCRIBE_SCHEMA, JobError, MathError, StartJobArgs, SumArgs, TOPIC_PROGRESS};

/// **VALUE**: Verifies every contract command has a handler.
///
/// **BUG THIS CATCHES**: Would catch a command added to the schema artifact
/// without a handler, which the server refuses at startup.
#[test]
fn given_contract_schema_when_building_registry_then_complete() {
    let schema = contract::schema().unwrap();
    let publisher = EventPublisher::new(schema.clone());

    let registry = build_registry(schema.clone(), &publisher).unwrap();

    assert!(registry.verify_complete().is_ok());
    assert_eq!(registry.len(), schema.commands().count());
}

#[tokio::test]
async fn given_overflowing_operands_when_summing_then_overflow() {
    let result = sum(SumArgs { a: i64::MAX, b: 1 }).await;

    assert_eq!(result, Err(MathError::Overflow));
}

/// **VALUE**: Verifies invalid job requests come back as the typed error.
///
/// **WHY THIS MATTERS**: The schema allows `steps = 0`; only the handler can
/// reject it, and the UI needs a reason it can show.
#[tokio::test]
async fn given_zero_steps_when_starting_job_then_invalid_request() {
    let publisher = EventPublisher::new(contract::schema().unwrap());

    let result = start_job(
        publisher,
        StartJobArgs {
            steps: 0,
            label: None,
        },
    )
    .await;

    match result {
        Err(JobError::InvalidRequest { reason }) => assert_eq!(reason, "Steps must be non-zero"),
        other => panic!("expected InvalidRequest, got {other:?}"),
    }
}

/// **VALUE**: Verifies each started job gets its own id.
#[tokio::test]
async fn given_valid_requests_when_starting_jobs_then_distinct_ids() {
    let publisher = EventPublisher::new(contract::schema().unwrap());
    let args = StartJobArgs::builder().with_steps(1).build().unwrap();

    let first = start_job(publisher.clone(), args.clone()).await.unwrap();
    let second = start_job(publisher, args).await.unwrap();

    assert_ne!(first.job_id, second.job_id);
}

#[test]
fn given_contract_schema_when_describing_then_lists_commands_and_topics() {
    let schema = contract::schema().unwrap();

    let info = schema_info(&schema);

    assert_eq!(info.name, "bridge-host");
    assert_eq!(info.version, 1);
    assert_eq!(info.fingerprint, schema.fingerprint());
    assert!(info.commands.iter().any(|c| c == CMD_DESCRIBE_SCHEMA));
    assert_eq!(info.topics, vec![TOPIC_PROGRESS.to_string()]);
}
