//! The bridge host's contract: its shared schema and the Rust types that
//! travel through it.
//!
//! Both processes load the same `bridge.schema.toml`. The types here mirror
//! its shapes so handlers and callers stay typed on either side.

pub mod error;
pub mod job;
pub mod types;

pub use error::ContractError;
pub use job::{MAX_JOB_STEPS, StartJobArgs, StartJobArgsBuilder};
pub use types::{
    JobError, JobStarted, MathError, NoArgs, ProgressEvent, SchemaInfo, SlowOpArgs, SumArgs,
};

use bridge_core::error::SchemaError;
use bridge_core::schema::Schema;

use std::sync::Arc;

use once_cell::sync::OnceCell;

#[cfg(test)]
mod tests;

pub const CMD_SUM: &str = "sum";
pub const CMD_SLOW_OP: &str = "slow_op";
pub const CMD_START_JOB: &str = "start_job";
pub const CMD_DESCRIBE_SCHEMA: &str = "describe_schema";

pub const TOPIC_PROGRESS: &str = "progress";

/// The schema artifact shipped with both processes.
pub const SCHEMA_TOML: &str = include_str!("../schema/bridge.schema.toml");

static SCHEMA: OnceCell<Arc<Schema>> = OnceCell::new();

/// The parsed contract schema, loaded once per process.
///
/// # Errors
///
/// Returns [`SchemaError`] if the bundled artifact does not parse or validate.
pub fn schema() -> Result<Arc<Schema>, SchemaError> {
    SCHEMA
        .get_or_try_init(|| Schema::from_toml_str(SCHEMA_TOML).map(Arc::new))
        .cloned()
}
