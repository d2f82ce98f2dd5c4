//! Marshaller: lossless conversion between native values and the wire format.
//!
//! The wire format is canonical JSON: object keys are sorted, absent optional
//! record fields are omitted, and 64-bit integers outside ±(2^53−1) travel as
//! decimal strings so a JavaScript UI never rounds them. The same logical
//! value always produces the same bytes.
//!
//! Every function validates against a [`Shape`] and fails with
//! [`BridgeError::SchemaMismatch`] naming the offending path (`$.items[2].id`).

mod walk;

use crate::error::bridge::BridgeError;
use crate::schema::{RecordShape, Shape};

use walk::{Mode, Walker};

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Largest integer a JavaScript number holds exactly (2^53 − 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

const ROOT: &str = "$";

/// Record of what a tolerant decoder discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Paths of undeclared fields dropped from records that tolerate extras.
    pub dropped_fields: Vec<String>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_fields.is_empty()
    }
}

/// A decoded native value together with its report.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub report: DecodeReport,
}

/// Serialize a Rust value and encode it against `shape`.
pub fn encode<T: Serialize + ?Sized>(shape: &Shape, value: &T) -> Result<Vec<u8>, BridgeError> {
    to_bytes(&to_wire(shape, &native(value)?)?)
}

/// Serialize a Rust value and encode it against a command's argument record.
pub fn encode_args<T: Serialize + ?Sized>(args: &RecordShape, value: &T) -> Result<Vec<u8>, BridgeError> {
    let mut report = DecodeReport::default();
    let wire = Walker::new(Mode::Encode, &mut report).record(args, &native(value)?, ROOT)?;
    to_bytes(&wire)
}

/// Encode an already-native JSON value against `shape`.
pub fn encode_value(shape: &Shape, value: &Value) -> Result<Vec<u8>, BridgeError> {
    to_bytes(&to_wire(shape, value)?)
}

/// Canonical wire form of a native value.
pub fn to_wire(shape: &Shape, value: &Value) -> Result<Value, BridgeError> {
    let mut report = DecodeReport::default();
    Walker::new(Mode::Encode, &mut report).walk(shape, value, ROOT)
}

/// Validate a wire value and restore its native form.
pub fn from_wire(shape: &Shape, value: &Value) -> Result<Decoded, BridgeError> {
    let mut report = DecodeReport::default();
    let value = Walker::new(Mode::Decode, &mut report).walk(shape, value, ROOT)?;
    log_report(&report);
    Ok(Decoded { value, report })
}

/// Decode payload bytes against `shape`.
pub fn decode_value(shape: &Shape, bytes: &[u8]) -> Result<Decoded, BridgeError> {
    from_wire(shape, &parse(bytes)?)
}

/// Decode payload bytes against a command's argument record.
pub fn decode_args(args: &RecordShape, bytes: &[u8]) -> Result<Decoded, BridgeError> {
    let mut report = DecodeReport::default();
    let value = Walker::new(Mode::Decode, &mut report).record(args, &parse(bytes)?, ROOT)?;
    log_report(&report);
    Ok(Decoded { value, report })
}

/// Decode payload bytes against `shape` straight into a Rust type.
pub fn decode<T: DeserializeOwned>(shape: &Shape, bytes: &[u8]) -> Result<T, BridgeError> {
    into_typed(decode_value(shape, bytes)?.value)
}

/// Convert a validated native value into a Rust type.
///
/// Fails with `SchemaMismatch` when the Rust type disagrees with the shape the
/// value was validated against.
#[track_caller]
pub fn into_typed<T: DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|e| {
        BridgeError::schema_mismatch(ROOT, format!("value does not fit the expected type: {e}"))
    })
}

#[track_caller]
fn native<T: Serialize + ?Sized>(value: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(value)
        .map_err(|e| BridgeError::schema_mismatch(ROOT, format!("value is not serializable: {e}")))
}

#[track_caller]
fn parse(bytes: &[u8]) -> Result<Value, BridgeError> {
    serde_json::from_slice(bytes)
        .map_err(|e| BridgeError::schema_mismatch(ROOT, format!("payload is not valid JSON: {e}")))
}

#[track_caller]
fn to_bytes(wire: &Value) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(wire)
        .map_err(|e| BridgeError::schema_mismatch(ROOT, format!("payload is not encodable: {e}")))
}

fn log_report(report: &DecodeReport) {
    if !report.is_clean() {
        warn!(
            "Tolerated {} undeclared field(s): {}",
            report.dropped_fields.len(),
            report.dropped_fields.join(", ")
        );
    }
}
