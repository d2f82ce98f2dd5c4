use crate::error::ContractError;

use common::ErrorLocation;

use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Upper bound on the steps a single job may run.
pub const MAX_JOB_STEPS: u32 = 1_000;

/// Arguments of `start_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartJobArgs {
    pub steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl StartJobArgs {
    pub fn builder() -> StartJobArgsBuilder {
        StartJobArgsBuilder::default()
    }

    /// Rules the schema cannot express. The backend checks these on every
    /// request.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.steps == 0 {
            return Err(ContractError::Validation {
                message: String::from("Steps must be non-zero"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.steps > MAX_JOB_STEPS {
            return Err(ContractError::Validation {
                message: format!("Steps must not exceed {MAX_JOB_STEPS}, got {}", self.steps),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.label.as_deref().is_some_and(|label| label.trim().is_empty()) {
            return Err(ContractError::Validation {
                message: String::from("Label cannot be blank"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }
}

/// Builder for validated [`StartJobArgs`].
#[derive(Debug, Default)]
pub struct StartJobArgsBuilder {
    steps: Option<u32>,
    label: Option<String>,
}

impl StartJobArgsBuilder {
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[track_caller]
    pub fn build(self) -> Result<StartJobArgs, ContractError> {
        let steps = self.steps.ok_or_else(|| ContractError::Validation {
            message: String::from("Steps is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let args = StartJobArgs {
            steps,
            label: self.label,
        };
        args.validate()?;

        Ok(args)
    }
}
