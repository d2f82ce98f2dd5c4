//! Schema entries for commands and event topics.

use crate::schema::shape::{ExtraFields, FieldSpec, RecordShape, Shape};

use serde::{Deserialize, Serialize};

/// One callable operation: its name, argument record, result and error shapes.
///
/// Immutable once it is part of a [`Schema`](crate::schema::Schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub args: RecordShape,
    #[serde(default = "unit_shape")]
    pub result: Shape,
    #[serde(default = "unit_shape")]
    pub error: Shape,
}

/// One event topic and the shape of every payload published on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSpec {
    pub topic: String,
    pub payload: Shape,
}

fn unit_shape() -> Shape {
    Shape::Unit
}

impl CommandSpec {
    /// A command taking no arguments, returning unit and failing with unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: RecordShape::default(),
            result: Shape::Unit,
            error: Shape::Unit,
        }
    }

    pub fn arg(mut self, field: FieldSpec) -> Self {
        self.args.fields.push(field);
        self
    }

    pub fn returns(mut self, shape: Shape) -> Self {
        self.result = shape;
        self
    }

    pub fn fails_with(mut self, shape: Shape) -> Self {
        self.error = shape;
        self
    }

    /// Accept (and report) argument keys this version does not declare.
    pub fn tolerate_extra_args(mut self) -> Self {
        self.args.extra = ExtraFields::Tolerate;
        self
    }
}

impl EventSpec {
    pub fn new(topic: impl Into<String>, payload: Shape) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}
