// Shared schema and types for unit tests

use crate::schema::{CommandSpec, EventSpec, FieldSpec, Schema, Shape, VariantCase};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SumArgs {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub(crate) enum MathError {
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NoArgs {}

pub(crate) fn sum_spec() -> CommandSpec {
    CommandSpec::new("sum")
        .arg(FieldSpec::required("a", Shape::I64))
        .arg(FieldSpec::required("b", Shape::I64))
        .returns(Shape::I64)
        .fails_with(Shape::variant([VariantCase::unit("Overflow")]))
}

pub(crate) fn progress_shape() -> Shape {
    Shape::record([
        FieldSpec::required("pct", Shape::U32),
        FieldSpec::optional("job_id", Shape::String),
    ])
}

/// `sum`, `explode` (panics) and `slow_op`, plus the `progress` topic.
pub(crate) fn demo_schema() -> Arc<Schema> {
    let schema = Schema::builder("demo", 1)
        .command(sum_spec())
        .command(CommandSpec::new("explode"))
        .command(CommandSpec::new("slow_op").arg(FieldSpec::required("millis", Shape::U64)))
        .event(EventSpec::new("progress", progress_shape()))
        .build()
        .expect("demo schema must build");
    Arc::new(schema)
}

pub(crate) async fn sum(args: SumArgs) -> Result<i64, MathError> {
    args.a.checked_add(args.b).ok_or(MathError::Overflow)
}
