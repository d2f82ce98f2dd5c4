use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("Schema Duplicate Error: {kind} {name} {location}")]
    Duplicate {
        kind: &'static str,
        name: String,
        location: ErrorLocation,
    },

    #[error("Schema Invalid Error: {reason} {location}")]
    Invalid {
        reason: String,
        location: ErrorLocation,
    },

    #[error("Schema Parse Error: {reason} {location}")]
    Parse {
        reason: String,
        location: ErrorLocation,
    },
}
