// Unit tests for the marshaller: canonical encoding, wide integers, strict decoding

use crate::error::BridgeError;
use crate::marshal::{self, MAX_SAFE_INTEGER};
use crate::schema::{ExtraFields, FieldSpec, RecordShape, Shape, VariantCase};
use crate::tests::fixtures::{SumArgs, sum_spec};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LineItem {
    sku: String,
    qty: u32,
    price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum Status {
    Pending,
    Shipped { carrier: String },
    Cancelled(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    balance: i64,
    items: Vec<LineItem>,
    tags: BTreeMap<String, String>,
    status: Status,
    note: Option<String>,
}

fn order_shape() -> Shape {
    Shape::record([
        FieldSpec::required("id", Shape::U64),
        FieldSpec::required("balance", Shape::I64),
        FieldSpec::required(
            "items",
            Shape::seq(Shape::record([
                FieldSpec::required("sku", Shape::String),
                FieldSpec::required("qty", Shape::U32),
                FieldSpec::required("price", Shape::F64),
            ])),
        ),
        FieldSpec::required("tags", Shape::map(Shape::String)),
        FieldSpec::required(
            "status",
            Shape::variant([
                VariantCase::unit("Pending"),
                VariantCase::new(
                    "Shipped",
                    Shape::record([FieldSpec::required("carrier", Shape::String)]),
                ),
                VariantCase::new("Cancelled", Shape::String),
            ]),
        ),
        FieldSpec::optional("note", Shape::String),
    ])
}

fn order(status: Status, note: Option<&str>) -> Order {
    Order {
        id: u64::MAX,
        balance: i64::MIN,
        items: vec![
            LineItem {
                sku: "A-1".to_string(),
                qty: 3,
                price: 19.99,
            },
            LineItem {
                sku: "B-2".to_string(),
                qty: 1,
                price: 0.1 + 0.2,
            },
        ],
        tags: BTreeMap::from([("region".to_string(), "eu".to_string())]),
        status,
        note: note.map(str::to_string),
    }
}

fn mismatch_path(result: Result<impl std::fmt::Debug, BridgeError>) -> String {
    match result {
        Err(BridgeError::SchemaMismatch { path, .. }) => path,
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

// ============================================
// ROUND TRIPS
// ============================================

/// **VALUE**: Verifies nested records, sequences, maps, optionals, every variant
/// form and extreme 64-bit integers survive encode then decode unchanged.
///
/// **WHY THIS MATTERS**: This is the round-trip law both processes rely on.
///
/// **BUG THIS CATCHES**: Would catch wide integers losing precision, floats
/// drifting, or variant content being dropped for a case.
#[test]
fn given_nested_values_when_round_tripping_then_values_are_identical() {
    let values = [
        order(Status::Pending, None),
        order(
            Status::Shipped {
                carrier: "post".to_string(),
            },
            Some("leave at door"),
        ),
        order(Status::Cancelled("duplicate".to_string()), Some("")),
    ];

    for value in values {
        let bytes = marshal::encode(&order_shape(), &value).unwrap();
        let decoded: Order = marshal::decode(&order_shape(), &bytes).unwrap();
        assert_eq!(decoded, value);
    }
}

/// **VALUE**: Verifies 64-bit integers switch to decimal strings exactly past
/// ±(2^53−1).
///
/// **WHY THIS MATTERS**: A JavaScript UI silently rounds numbers above 2^53.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one at the boundary or a sign
/// error on negative values.
#[test]
fn given_safe_range_boundary_when_encoding_then_strings_only_outside_it() {
    let max = MAX_SAFE_INTEGER as i64;

    assert_eq!(marshal::encode(&Shape::I64, &max).unwrap(), b"9007199254740991");
    assert_eq!(
        marshal::encode(&Shape::I64, &(max + 1)).unwrap(),
        br#""9007199254740992""#
    );
    assert_eq!(marshal::encode(&Shape::I64, &-max).unwrap(), b"-9007199254740991");
    assert_eq!(
        marshal::encode(&Shape::I64, &(-max - 1)).unwrap(),
        br#""-9007199254740992""#
    );
    assert_eq!(
        marshal::encode(&Shape::U64, &u64::MAX).unwrap(),
        br#""18446744073709551615""#
    );
}

/// **VALUE**: Verifies encoding is deterministic: keys are sorted and absent
/// optional fields are omitted.
///
/// **WHY THIS MATTERS**: Identical values must produce identical bytes.
///
/// **BUG THIS CATCHES**: Would catch insertion-ordered maps or `null` being
/// emitted for absent optionals.
#[test]
fn given_unordered_native_value_when_encoding_then_canonical_bytes() {
    let shape = Shape::record([
        FieldSpec::required("b", Shape::I32),
        FieldSpec::required("a", Shape::I32),
        FieldSpec::optional("z", Shape::String),
    ]);

    let first = marshal::encode_value(&shape, &json!({"b": 2, "a": 1, "z": null})).unwrap();
    let second = marshal::encode_value(&shape, &json!({"a": 1, "b": 2})).unwrap();

    assert_eq!(first, br#"{"a":1,"b":2}"#);
    assert_eq!(first, second);
}

/// **VALUE**: Verifies argument records encode from Rust structs.
#[test]
fn given_sum_args_when_encoding_args_then_plain_record() {
    let bytes = marshal::encode_args(&sum_spec().args, &SumArgs { a: 2, b: 3 }).unwrap();

    assert_eq!(bytes, br#"{"a":2,"b":3}"#);
}

// ============================================
// STRICT DECODING
// ============================================

/// **VALUE**: Verifies a string where a number is declared is a mismatch naming
/// the field, never a coercion.
///
/// **WHY THIS MATTERS**: `sum({a: "x", b: 3})` must fail with `SchemaMismatch`.
///
/// **BUG THIS CATCHES**: Would catch lenient parsing that turns "x" into 0.
#[test]
fn given_string_for_integer_when_decoding_args_then_schema_mismatch_at_field() {
    let result = marshal::decode_args(&sum_spec().args, br#"{"a":"x","b":3}"#);

    assert_eq!(mismatch_path(result), "$.a");
}

/// **VALUE**: Verifies only the canonical form of a 64-bit integer is accepted.
///
/// **WHY THIS MATTERS**: A wide value sent as a JSON number was already rounded
/// by the sender; accepting it would hide data loss.
///
/// **BUG THIS CATCHES**: Would catch decoders accepting both forms, or
/// accepting a signed or zero-padded string that re-encodes to other bytes.
#[test]
fn given_non_canonical_wide_integers_when_decoding_then_schema_mismatch() {
    assert!(marshal::decode_value(&Shape::I64, b"9007199254740992").is_err());
    assert!(marshal::decode_value(&Shape::I64, br#""42""#).is_err());
    assert!(marshal::decode_value(&Shape::U64, b"-1").is_err());
    assert!(marshal::decode_value(&Shape::I64, br#""+9007199254740992""#).is_err());
    assert!(marshal::decode_value(&Shape::I64, br#""09007199254740992""#).is_err());
    assert!(marshal::decode_value(&Shape::U64, br#"" 9007199254740992""#).is_err());
    assert_eq!(
        marshal::decode::<u64>(&Shape::U64, br#""9007199254740992""#).unwrap(),
        MAX_SAFE_INTEGER + 1
    );
}

/// **VALUE**: Verifies primitives are never coerced across types or ranges.
///
/// **BUG THIS CATCHES**: Would catch `1` accepted as `true`, a float accepted as
/// an integer, or an out-of-range value truncated into i32.
#[test]
fn given_wrong_primitive_when_decoding_then_schema_mismatch() {
    let cases: [(Shape, &[u8]); 7] = [
        (Shape::Bool, b"1"),
        (Shape::Bool, br#""true""#),
        (Shape::I32, b"2147483648"),
        (Shape::I32, b"1.5"),
        (Shape::U32, b"-1"),
        (Shape::String, b"7"),
        (Shape::Unit, b"{}"),
    ];

    for (shape, payload) in cases {
        let result = marshal::decode_value(&shape, payload);
        assert!(
            matches!(result, Err(BridgeError::SchemaMismatch { .. })),
            "{shape:?} accepted {}",
            String::from_utf8_lossy(payload)
        );
    }
}

/// **VALUE**: Verifies non-finite floats are reported instead of becoming `null`.
///
/// **BUG THIS CATCHES**: Would catch NaN silently encoded as JSON null.
#[test]
fn given_nan_when_encoding_f64_then_schema_mismatch() {
    assert!(matches!(
        marshal::encode(&Shape::F64, &f64::NAN),
        Err(BridgeError::SchemaMismatch { .. })
    ));
}

/// **VALUE**: Verifies missing and undeclared record fields are reported with
/// their paths.
///
/// **BUG THIS CATCHES**: Would catch undeclared fields being dropped silently.
#[test]
fn given_missing_or_undeclared_fields_when_decoding_then_schema_mismatch_paths() {
    let args = sum_spec().args;

    assert_eq!(mismatch_path(marshal::decode_args(&args, br#"{"a":1}"#)), "$.b");
    assert_eq!(
        mismatch_path(marshal::decode_args(&args, br#"{"a":1,"b":2,"c":3}"#)),
        "$.c"
    );
    assert_eq!(
        mismatch_path(marshal::decode_value(
            &order_shape(),
            br#"{"balance":0,"id":1,"items":[{"price":1.0,"qty":1,"sku":"a"},{"price":1.0,"qty":"1","sku":"b"}],"status":{"type":"Pending"},"tags":{}}"#,
        )),
        "$.items[1].qty"
    );
}

/// **VALUE**: Verifies a record that opts into tolerance drops and reports
/// undeclared fields on decode, but still rejects them on encode.
///
/// **WHY THIS MATTERS**: Forward-compatible records must tell the caller exactly
/// what was discarded.
///
/// **BUG THIS CATCHES**: Would catch tolerance leaking into the encoder or the
/// report missing nested paths.
#[test]
fn given_tolerant_record_when_decoding_extra_fields_then_dropped_and_reported() {
    // GIVEN
    let mut tolerant = RecordShape {
        fields: vec![FieldSpec::required("pct", Shape::U32)],
        extra: ExtraFields::Tolerate,
    };
    let shape = Shape::seq(Shape::Record(tolerant.clone()));

    // WHEN
    let decoded = marshal::decode_value(&shape, br#"[{"pct":5,"eta":9},{"pct":6}]"#).unwrap();

    // THEN
    assert_eq!(decoded.value, json!([{"pct": 5}, {"pct": 6}]));
    assert_eq!(decoded.report.dropped_fields, vec!["$[0].eta".to_string()]);
    assert!(marshal::encode_value(&shape, &json!([{"pct": 5, "eta": 9}])).is_err());

    tolerant.extra = ExtraFields::Reject;
    assert!(marshal::decode_args(&tolerant, br#"{"pct":5,"eta":9}"#).is_err());
}

/// **VALUE**: Verifies malformed variants are rejected.
///
/// **BUG THIS CATCHES**: Would catch unknown tags falling through to the first
/// case or missing `data` being treated as unit.
#[test]
fn given_malformed_variants_when_decoding_then_schema_mismatch() {
    let shape = order_shape();
    let Shape::Record(record) = &shape else {
        unreachable!()
    };
    let status = &record.fields[4].shape;

    let cases: [&[u8]; 4] = [
        br#"{"type":"Lost"}"#,
        br#"{"type":"Shipped"}"#,
        br#"{"data":"x"}"#,
        br#"{"type":"Pending","extra":1}"#,
    ];
    for payload in cases {
        assert!(
            marshal::decode_value(status, payload).is_err(),
            "accepted {}",
            String::from_utf8_lossy(payload)
        );
    }
}

/// **VALUE**: Verifies invalid JSON is a mismatch at the root.
#[test]
fn given_invalid_json_when_decoding_then_schema_mismatch_at_root() {
    assert_eq!(mismatch_path(marshal::decode_value(&Shape::Unit, b"{")), "$");
}
