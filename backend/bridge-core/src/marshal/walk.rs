//! Shape-directed traversal shared by the encoder and the decoder.
//!
//! Encoding turns a native value (whatever `serde_json::to_value` produced for a
//! Rust type, or a value handed over by the UI) into its canonical wire form.
//! Decoding checks a wire value against the shape and restores the native form.
//! Both directions validate the full shape; neither coerces.

use crate::error::bridge::BridgeError;
use crate::marshal::{DecodeReport, MAX_SAFE_INTEGER};
use crate::schema::{ExtraFields, RecordShape, Shape, VariantShape};

use std::fmt::Display;
use std::str::FromStr;

use serde_json::{Map, Number, Value};

pub(crate) const VARIANT_TAG: &str = "type";
pub(crate) const VARIANT_CONTENT: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Encode,
    Decode,
}

pub(crate) struct Walker<'r> {
    mode: Mode,
    report: &'r mut DecodeReport,
}

impl<'r> Walker<'r> {
    pub(crate) fn new(mode: Mode, report: &'r mut DecodeReport) -> Self {
        Self { mode, report }
    }

    pub(crate) fn walk(&mut self, shape: &Shape, value: &Value, path: &str) -> Result<Value, BridgeError> {
        match shape {
            Shape::Unit => match value {
                Value::Null => Ok(Value::Null),
                other => Err(expected(path, shape, other)),
            },
            Shape::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(expected(path, shape, other)),
            },
            Shape::I32 => narrow_int(path, shape, value, |n| {
                n.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::from)
            }),
            Shape::U32 => narrow_int(path, shape, value, |n| {
                n.as_u64().and_then(|v| u32::try_from(v).ok()).map(Value::from)
            }),
            Shape::I64 => self.wide_int(path, shape, value, Number::as_i64, |v: i64| {
                v.unsigned_abs() <= MAX_SAFE_INTEGER
            }),
            Shape::U64 => self.wide_int(path, shape, value, Number::as_u64, |v: u64| {
                v <= MAX_SAFE_INTEGER
            }),
            Shape::F64 => float(path, shape, value),
            Shape::String => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(expected(path, shape, other)),
            },
            Shape::Optional(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => self.walk(inner, other, path),
            },
            Shape::Seq(item) => match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.walk(item, v, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(expected(path, shape, other)),
            },
            Shape::Map(entry) => match value {
                Value::Object(map) => {
                    let mut out = Map::new();
                    for (key, v) in map {
                        out.insert(key.clone(), self.walk(entry, v, &format!("{path}.{key}"))?);
                    }
                    Ok(Value::Object(out))
                }
                other => Err(expected(path, shape, other)),
            },
            Shape::Record(record) => self.record(record, value, path),
            Shape::Variant(variant) => self.variant(variant, value, path),
        }
    }

    pub(crate) fn record(&mut self, record: &RecordShape, value: &Value, path: &str) -> Result<Value, BridgeError> {
        let Value::Object(map) = value else {
            return Err(BridgeError::schema_mismatch(
                path,
                format!("expected record, found {}", describe(value)),
            ));
        };

        let mut out = Map::new();
        for field in &record.fields {
            let field_path = format!("{path}.{}", field.name);
            match map.get(&field.name) {
                None | Some(Value::Null) if !field.required => {}
                None => {
                    return Err(BridgeError::schema_mismatch(
                        field_path,
                        "missing required field",
                    ));
                }
                Some(v) => {
                    out.insert(field.name.clone(), self.walk(&field.shape, v, &field_path)?);
                }
            }
        }

        for key in map.keys().filter(|k| record.field(k).is_none()) {
            let field_path = format!("{path}.{key}");
            match (self.mode, record.extra) {
                (Mode::Decode, ExtraFields::Tolerate) => self.report.dropped_fields.push(field_path),
                _ => {
                    return Err(BridgeError::schema_mismatch(
                        field_path,
                        "field is not declared in the schema",
                    ));
                }
            }
        }

        Ok(Value::Object(out))
    }

    fn variant(&mut self, variant: &VariantShape, value: &Value, path: &str) -> Result<Value, BridgeError> {
        let Value::Object(map) = value else {
            return Err(BridgeError::schema_mismatch(
                path,
                format!("expected variant, found {}", describe(value)),
            ));
        };

        let tag = match map.get(VARIANT_TAG) {
            Some(Value::String(tag)) => tag,
            _ => {
                return Err(BridgeError::schema_mismatch(
                    path,
                    format!("variant requires a string '{VARIANT_TAG}' key"),
                ));
            }
        };
        if let Some(extra) = map
            .keys()
            .find(|k| k.as_str() != VARIANT_TAG && k.as_str() != VARIANT_CONTENT)
        {
            return Err(BridgeError::schema_mismatch(
                format!("{path}.{extra}"),
                "unexpected key in variant",
            ));
        }
        let case = variant
            .cases
            .iter()
            .find(|c| &c.tag == tag)
            .ok_or_else(|| {
                BridgeError::schema_mismatch(path, format!("unknown variant case '{tag}'"))
            })?;

        let mut out = Map::new();
        out.insert(VARIANT_TAG.to_string(), Value::String(tag.clone()));
        let content_path = format!("{path}.{tag}");
        match (&case.shape, map.get(VARIANT_CONTENT)) {
            (Shape::Unit, None | Some(Value::Null)) => {}
            (_, None) => {
                return Err(BridgeError::schema_mismatch(
                    content_path,
                    format!("variant case requires a '{VARIANT_CONTENT}' key"),
                ));
            }
            (shape, Some(content)) => {
                out.insert(
                    VARIANT_CONTENT.to_string(),
                    self.walk(shape, content, &content_path)?,
                );
            }
        }
        Ok(Value::Object(out))
    }

    /// 64-bit integers: plain numbers inside the safe range, decimal strings
    /// outside it. Decoding accepts only that canonical form; encoding also
    /// accepts plain numbers of any magnitude because native Rust values are
    /// exact.
    fn wide_int<T>(
        &self,
        path: &str,
        shape: &Shape,
        value: &Value,
        from_number: fn(&Number) -> Option<T>,
        is_safe: fn(T) -> bool,
    ) -> Result<Value, BridgeError>
    where
        T: Copy + Display + FromStr + Into<Value>,
    {
        let n = match value {
            Value::Number(number) => {
                let n = from_number(number).ok_or_else(|| expected(path, shape, value))?;
                if self.mode == Mode::Decode && !is_safe(n) {
                    return Err(BridgeError::schema_mismatch(
                        path,
                        format!("{n} exceeds the safe integer range and must be a decimal string"),
                    ));
                }
                n
            }
            Value::String(text) => {
                let n: T = text
                    .parse()
                    .ok()
                    .filter(|n: &T| n.to_string() == *text)
                    .ok_or_else(|| {
                        BridgeError::schema_mismatch(
                            path,
                            format!(
                                "expected canonical {} decimal string, found '{text}'",
                                shape.type_name()
                            ),
                        )
                    })?;
                if is_safe(n) {
                    return Err(BridgeError::schema_mismatch(
                        path,
                        format!("{n} is within the safe integer range and must be a number"),
                    ));
                }
                n
            }
            other => return Err(expected(path, shape, other)),
        };

        match self.mode {
            Mode::Encode if !is_safe(n) => Ok(Value::String(n.to_string())),
            _ => Ok(n.into()),
        }
    }
}

fn narrow_int(
    path: &str,
    shape: &Shape,
    value: &Value,
    convert: fn(&Number) -> Option<Value>,
) -> Result<Value, BridgeError> {
    match value {
        Value::Number(number) => convert(number).ok_or_else(|| {
            BridgeError::schema_mismatch(
                path,
                format!("{number} does not fit {}", shape.type_name()),
            )
        }),
        other => Err(expected(path, shape, other)),
    }
}

fn float(path: &str, shape: &Shape, value: &Value) -> Result<Value, BridgeError> {
    let Value::Number(number) = value else {
        return Err(match value {
            Value::Null => BridgeError::schema_mismatch(
                path,
                "expected f64, found null (non-finite floats are not representable)",
            ),
            other => expected(path, shape, other),
        });
    };

    let exact = if let Some(i) = number.as_i64() {
        (i.unsigned_abs() <= MAX_SAFE_INTEGER).then_some(i as f64)
    } else if let Some(u) = number.as_u64() {
        (u <= MAX_SAFE_INTEGER).then_some(u as f64)
    } else {
        number.as_f64()
    };

    exact
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            BridgeError::schema_mismatch(path, format!("{number} is not exactly representable as f64"))
        })
}

#[track_caller]
fn expected(path: &str, shape: &Shape, found: &Value) -> BridgeError {
    BridgeError::schema_mismatch(
        path,
        format!("expected {}, found {}", shape.type_name(), describe(found)),
    )
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
