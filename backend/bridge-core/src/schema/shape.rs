//! Type shapes expressible in the shared schema.

use crate::error::schema::SchemaError;

use common::ErrorLocation;

use std::collections::HashSet;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// The declared type of an argument, result, error or event payload.
///
/// Shapes serialize as `{ type = "i64" }` or `{ type = "seq", of = { type = "string" } }`
/// so a schema can be kept in a TOML artifact shared by both processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum Shape {
    Unit,
    Bool,
    I32,
    I64,
    U32,
    U64,
    F64,
    String,
    Optional(Box<Shape>),
    Seq(Box<Shape>),
    /// Mapping with string keys.
    Map(Box<Shape>),
    Record(RecordShape),
    /// Sum type, carried as `{"type": <tag>, "data": <payload>}`.
    Variant(VariantShape),
}

/// What a decoder does with object keys a record does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFields {
    #[default]
    Reject,
    /// Drop undeclared keys and record each one in the decode report.
    Tolerate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShape {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub shape: Shape,
    #[serde(default = "default_required")]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantShape {
    pub cases: Vec<VariantCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCase {
    pub tag: String,
    /// `unit` for cases without data.
    #[serde(default = "default_case_shape")]
    pub shape: Shape,
}

fn default_required() -> bool {
    true
}

fn default_case_shape() -> Shape {
    Shape::Unit
}

impl Shape {
    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    pub fn seq(item: Shape) -> Self {
        Shape::Seq(Box::new(item))
    }

    pub fn map(value: Shape) -> Self {
        Shape::Map(Box::new(value))
    }

    pub fn record(fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        Shape::Record(RecordShape {
            fields: fields.into_iter().collect(),
            extra: ExtraFields::Reject,
        })
    }

    pub fn variant(cases: impl IntoIterator<Item = VariantCase>) -> Self {
        Shape::Variant(VariantShape {
            cases: cases.into_iter().collect(),
        })
    }

    /// Short name used in mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Unit => "unit",
            Shape::Bool => "bool",
            Shape::I32 => "i32",
            Shape::I64 => "i64",
            Shape::U32 => "u32",
            Shape::U64 => "u64",
            Shape::F64 => "f64",
            Shape::String => "string",
            Shape::Optional(_) => "optional",
            Shape::Seq(_) => "seq",
            Shape::Map(_) => "map",
            Shape::Record(_) => "record",
            Shape::Variant(_) => "variant",
        }
    }

    /// Reject shapes no value could satisfy unambiguously: duplicate field
    /// names, duplicate variant tags, empty names, nested optionals.
    #[track_caller]
    pub(crate) fn check_well_formed(&self, path: &str) -> Result<(), SchemaError> {
        match self {
            Shape::Optional(inner) if matches!(**inner, Shape::Optional(_)) => Err(invalid(
                format!("{path}: optional of optional cannot tell absent from null"),
            )),
            Shape::Optional(inner) | Shape::Seq(inner) | Shape::Map(inner) => {
                inner.check_well_formed(&format!("{path}.{}", self.type_name()))
            }
            Shape::Record(record) => record.check_well_formed(path),
            Shape::Variant(variant) => {
                if variant.cases.is_empty() {
                    return Err(invalid(format!("{path}: variant declares no cases")));
                }
                let mut seen = HashSet::new();
                for case in &variant.cases {
                    if case.tag.is_empty() {
                        return Err(invalid(format!("{path}: variant case with empty tag")));
                    }
                    if !seen.insert(case.tag.as_str()) {
                        return Err(invalid(format!(
                            "{path}: duplicate variant tag '{}'",
                            case.tag
                        )));
                    }
                    case.shape.check_well_formed(&format!("{path}.{}", case.tag))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl RecordShape {
    #[track_caller]
    pub(crate) fn check_well_formed(&self, path: &str) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid(format!("{path}: field with empty name")));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!(
                    "{path}: duplicate field '{}'",
                    field.name
                )));
            }
            if !field.required && matches!(field.shape, Shape::Optional(_)) {
                return Err(invalid(format!(
                    "{path}: optional field '{}' has an optional shape",
                    field.name
                )));
            }
            field
                .shape
                .check_well_formed(&format!("{path}.{}", field.name))?;
        }
        Ok(())
    }

    pub(crate) fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
        }
    }

    /// A field that may be absent or `null`.
    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
        }
    }
}

impl VariantCase {
    pub fn new(tag: impl Into<String>, shape: Shape) -> Self {
        Self {
            tag: tag.into(),
            shape,
        }
    }

    pub fn unit(tag: impl Into<String>) -> Self {
        Self::new(tag, Shape::Unit)
    }
}

#[track_caller]
fn invalid(reason: String) -> SchemaError {
    SchemaError::Invalid {
        reason,
        location: ErrorLocation::from(Location::caller()),
    }
}
