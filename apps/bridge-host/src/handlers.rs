//! Command handlers for the contract schema.

use bridge_core::error::BridgeError;
use bridge_core::registry::CommandRegistry;
use bridge_core::schema::Schema;
use bridge_core::server::EventPublisher;

use contract::{
    CMD_DESCRIBE_SCHEMA, CMD_SLOW_OP, CMD_START_JOB, CMD_SUM, ContractError, JobError, JobStarted,
    MathError, NoArgs, ProgressEvent, SchemaInfo, SlowOpArgs, StartJobArgs, SumArgs,
    TOPIC_PROGRESS,
};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::spawn as TokioSpawn;
use tokio::time::sleep as TokioSleep;
use uuid::Uuid;

/// Pause between two progress events of a job.
pub const JOB_STEP_INTERVAL: Duration = Duration::from_millis(100);

/// Registry with a handler for every contract command.
///
/// `publisher` must be the publisher the server is built with, so job
/// progress reaches connected links.
pub fn build_registry(
    schema: Arc<Schema>,
    publisher: &EventPublisher,
) -> Result<CommandRegistry, BridgeError> {
    let mut registry = CommandRegistry::new(Arc::clone(&schema));

    registry.handle(CMD_SUM, sum)?;
    registry.handle(CMD_SLOW_OP, slow_op)?;

    let jobs = publisher.clone();
    registry.handle(CMD_START_JOB, move |args: StartJobArgs| {
        start_job(jobs.clone(), args)
    })?;

    let info = schema_info(&schema);
    registry.handle(CMD_DESCRIBE_SCHEMA, move |_: NoArgs| {
        let info = info.clone();
        async move { Ok::<_, ()>(info) }
    })?;

    Ok(registry)
}

pub async fn sum(args: SumArgs) -> Result<i64, MathError> {
    args.a.checked_add(args.b).ok_or(MathError::Overflow)
}

async fn slow_op(args: SlowOpArgs) -> Result<(), ()> {
    debug!("slow_op sleeping {} ms", args.millis);
    TokioSleep(Duration::from_millis(args.millis)).await;
    Ok(())
}

/// Validate the request and start the job in the background.
///
/// The reply carries the job id as soon as the job is scheduled; progress
/// follows on the `progress` topic. Cancelling the call does not stop a job
/// that already started.
pub async fn start_job(publisher: EventPublisher, args: StartJobArgs) -> Result<JobStarted, JobError> {
    args.validate().map_err(|e| match e {
        ContractError::Validation { message, .. } => JobError::InvalidRequest { reason: message },
    })?;

    let job_id = Uuid::new_v4().to_string();
    info!(
        "Job {job_id} started ({} steps{})",
        args.steps,
        args.label
            .as_deref()
            .map(|label| format!(", '{label}'"))
            .unwrap_or_default()
    );
    TokioSpawn(run_job(publisher, job_id.clone(), args.steps));

    Ok(JobStarted { job_id })
}

async fn run_job(publisher: EventPublisher, job_id: String, steps: u32) {
    for step in 1..=steps {
        TokioSleep(JOB_STEP_INTERVAL).await;
        let event = ProgressEvent {
            pct: step * 100 / steps,
            job_id: Some(job_id.clone()),
        };
        if let Err(e) = publisher.publish(TOPIC_PROGRESS, &event).await {
            error!("Job {job_id} stopped: {e}");
            return;
        }
    }
    info!("Job {job_id} finished");
}

pub fn schema_info(schema: &Schema) -> SchemaInfo {
    SchemaInfo {
        name: schema.name().to_string(),
        version: schema.version(),
        fingerprint: schema.fingerprint().to_string(),
        commands: schema.commands().map(|c| c.name.clone()).collect(),
        topics: schema.events().map(|e| e.topic.clone()).collect(),
    }
}
