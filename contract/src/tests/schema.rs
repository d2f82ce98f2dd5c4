// Unit tests for the contract schema artifact
// Every Rust type must fit the shape the artifact declares for it

use crate::{
    CMD_DESCRIBE_SCHEMA, CMD_SLOW_OP, CMD_START_JOB, CMD_SUM, JobError, JobStarted, MathError,
    NoArgs, ProgressEvent, SchemaInfo, SlowOpArgs, StartJobArgs, SumArgs, TOPIC_PROGRESS, schema,
};

use bridge_core::marshal;

use std::sync::Arc;

/// **VALUE**: Verifies the bundled artifact parses and declares exactly the
/// contract's commands and topics.
///
/// **BUG THIS CATCHES**: Would catch a command constant drifting from the
/// artifact, which would only surface as `UnknownCommand` at runtime.
#[test]
fn given_bundled_artifact_when_loading_then_declares_contract_names() {
    // WHEN
    let schema = schema().unwrap();

    // THEN
    let commands: Vec<&str> = schema.commands().map(|c| c.name.as_str()).collect();
    assert_eq!(
        commands,
        vec![CMD_DESCRIBE_SCHEMA, CMD_SLOW_OP, CMD_START_JOB, CMD_SUM]
    );
    let topics: Vec<&str> = schema.events().map(|e| e.topic.as_str()).collect();
    assert_eq!(topics, vec![TOPIC_PROGRESS]);
}

/// **VALUE**: Verifies the schema is parsed once and shared.
#[test]
fn given_schema_loaded_twice_when_comparing_then_same_instance() {
    let first = schema().unwrap();
    let second = schema().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
}

/// **VALUE**: Verifies argument types fit their commands' argument records.
///
/// **WHY THIS MATTERS**: The client validates arguments before sending; a
/// type that does not fit could never be called.
#[test]
fn given_contract_args_when_encoding_then_fit_declared_records() {
    let schema = schema().unwrap();

    let sum = marshal::encode_args(
        &schema.command(CMD_SUM).unwrap().args,
        &SumArgs { a: 2, b: 3 },
    );
    let slow = marshal::encode_args(
        &schema.command(CMD_SLOW_OP).unwrap().args,
        &SlowOpArgs { millis: 10 },
    );
    let job = marshal::encode_args(
        &schema.command(CMD_START_JOB).unwrap().args,
        &StartJobArgs {
            steps: 3,
            label: None,
        },
    );
    let describe = marshal::encode_args(
        &schema.command(CMD_DESCRIBE_SCHEMA).unwrap().args,
        &NoArgs {},
    );

    assert!(sum.is_ok(), "{sum:?}");
    assert!(slow.is_ok(), "{slow:?}");
    assert!(job.is_ok(), "{job:?}");
    assert!(describe.is_ok(), "{describe:?}");
}

/// **VALUE**: Verifies result, error and event types fit their shapes.
///
/// **BUG THIS CATCHES**: Would catch a serde attribute change (e.g. dropping
/// `tag`/`content`) that makes handler errors unencodable.
#[test]
fn given_contract_results_and_errors_when_encoding_then_fit_declared_shapes() {
    let schema = schema().unwrap();
    let start_job = schema.command(CMD_START_JOB).unwrap();

    let started = marshal::encode(
        &start_job.result,
        &JobStarted {
            job_id: String::from("job-1"),
        },
    );
    let invalid = marshal::encode(
        &start_job.error,
        &JobError::InvalidRequest {
            reason: String::from("no"),
        },
    );
    let overflow = marshal::encode(&schema.command(CMD_SUM).unwrap().error, &MathError::Overflow);
    let info = marshal::encode(
        &schema.command(CMD_DESCRIBE_SCHEMA).unwrap().result,
        &SchemaInfo {
            name: String::from("bridge-host"),
            version: 1,
            fingerprint: String::from("abc"),
            commands: vec![String::from(CMD_SUM)],
            topics: vec![String::from(TOPIC_PROGRESS)],
        },
    );
    let progress = marshal::encode(
        &schema.event(TOPIC_PROGRESS).unwrap().payload,
        &ProgressEvent {
            pct: 40,
            job_id: Some(String::from("job-1")),
        },
    );

    assert!(started.is_ok(), "{started:?}");
    assert!(invalid.is_ok(), "{invalid:?}");
    assert!(overflow.is_ok(), "{overflow:?}");
    assert!(info.is_ok(), "{info:?}");
    assert!(progress.is_ok(), "{progress:?}");
}

/// **VALUE**: Verifies an event without a job id decodes into the typed payload.
#[test]
fn given_progress_without_job_id_when_decoding_then_job_id_is_none() {
    let schema = schema().unwrap();

    let event: ProgressEvent = marshal::decode(
        &schema.event(TOPIC_PROGRESS).unwrap().payload,
        br#"{"pct":7}"#,
    )
    .unwrap();

    assert_eq!(
        event,
        ProgressEvent {
            pct: 7,
            job_id: None
        }
    );
}
