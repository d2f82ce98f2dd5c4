// Unit tests for the shared schema: validation, lookup and fingerprinting

use crate::error::BridgeError;
use crate::error::schema::SchemaError;
use crate::schema::{CommandSpec, EventSpec, FieldSpec, Schema, Shape, VariantCase};
use crate::tests::fixtures::{demo_schema, progress_shape, sum_spec};

const SCHEMA_TOML: &str = r#"
name = "demo"
version = 1

[[commands]]
name = "sum"
result = { type = "i64" }
args.fields = [
    { name = "a", shape = { type = "i64" } },
    { name = "b", shape = { type = "i64" } },
]

[[events]]
topic = "progress"
payload = { type = "record", of = { fields = [{ name = "pct", shape = { type = "u32" } }] } }
"#;

/// **VALUE**: Verifies lookups of undeclared commands and topics fail with the
/// dedicated error kinds.
///
/// **WHY THIS MATTERS**: The client resolves `UnknownCommand` locally from this
/// lookup, so a typo never crosses the process boundary.
///
/// **BUG THIS CATCHES**: Would catch a lookup that returns a default spec or a
/// generic error instead of naming the missing command.
#[test]
fn given_schema_when_looking_up_undeclared_names_then_unknown_errors() {
    // GIVEN
    let schema = demo_schema();

    // WHEN / THEN
    assert!(schema.command("sum").is_ok());
    assert!(matches!(
        schema.command("summ"),
        Err(BridgeError::UnknownCommand { ref name, .. }) if name == "summ"
    ));
    assert!(matches!(
        schema.event("progres"),
        Err(BridgeError::UnknownTopic { ref topic, .. }) if topic == "progres"
    ));
}

/// **VALUE**: Verifies command names are unique across the schema.
///
/// **WHY THIS MATTERS**: Two specs under one name would make dispatch ambiguous.
///
/// **BUG THIS CATCHES**: Would catch a BTreeMap insert silently replacing the
/// first spec.
#[test]
fn given_duplicate_command_when_building_then_duplicate_error() {
    // GIVEN
    let builder = Schema::builder("demo", 1)
        .command(sum_spec())
        .command(CommandSpec::new("sum"));

    // WHEN
    let result = builder.build();

    // THEN
    match result {
        Err(SchemaError::Duplicate { kind, name, .. }) => {
            assert_eq!(kind, "command");
            assert_eq!(name, "sum");
        }
        other => panic!("expected duplicate command error, got {other:?}"),
    }
}

/// **VALUE**: Verifies topics are unique as well.
///
/// **BUG THIS CATCHES**: Would catch duplicate detection that only covers commands.
#[test]
fn given_duplicate_topic_when_building_then_duplicate_error() {
    let result = Schema::builder("demo", 1)
        .event(EventSpec::new("progress", progress_shape()))
        .event(EventSpec::new("progress", Shape::Unit))
        .build();

    assert!(matches!(
        result,
        Err(SchemaError::Duplicate { kind: "topic", .. })
    ));
}

/// **VALUE**: Verifies malformed schemas are rejected at build time.
///
/// **WHY THIS MATTERS**: A shape with two fields of the same name or two variant
/// cases with the same tag cannot be decoded unambiguously.
///
/// **BUG THIS CATCHES**: Would catch validation that skips nested shapes.
#[test]
fn given_malformed_definitions_when_building_then_invalid_error() {
    let cases = [
        Schema::builder("demo", 0).build(),
        Schema::builder("de mo", 1).build(),
        Schema::builder("demo", 1)
            .command(CommandSpec::new(""))
            .build(),
        Schema::builder("demo", 1)
            .command(
                CommandSpec::new("dup_field")
                    .arg(FieldSpec::required("a", Shape::I32))
                    .arg(FieldSpec::optional("a", Shape::String)),
            )
            .build(),
        Schema::builder("demo", 1)
            .command(CommandSpec::new("dup_tag").returns(Shape::seq(Shape::variant([
                VariantCase::unit("A"),
                VariantCase::new("A", Shape::Bool),
            ]))))
            .build(),
        Schema::builder("demo", 1)
            .event(EventSpec::new("empty", Shape::variant([])))
            .build(),
    ];

    for (i, result) in cases.into_iter().enumerate() {
        assert!(
            matches!(result, Err(SchemaError::Invalid { .. })),
            "case {i} should be invalid, got {result:?}"
        );
    }
}

/// **VALUE**: Verifies optional shapes cannot be nested, neither directly nor
/// through an optional field.
///
/// **WHY THIS MATTERS**: `Some(None)` and `None` both travel as `null` or an
/// absent field, so a nested optional cannot survive an encode/decode round
/// trip.
///
/// **BUG THIS CATCHES**: Would catch the builder accepting a schema whose
/// values silently collapse `Some(None)` into `None`.
#[test]
fn given_nested_optional_shapes_when_building_then_invalid_error() {
    // GIVEN
    let nested = Schema::builder("demo", 1).command(
        CommandSpec::new("maybe")
            .returns(Shape::optional(Shape::optional(Shape::I64))),
    );
    let optional_field = Schema::builder("demo", 1).command(
        CommandSpec::new("note")
            .arg(FieldSpec::optional("text", Shape::optional(Shape::String))),
    );
    let required_field = Schema::builder("demo", 1).command(
        CommandSpec::new("note")
            .arg(FieldSpec::required("text", Shape::optional(Shape::String))),
    );

    // WHEN
    let nested = nested.build();
    let optional_field = optional_field.build();
    let required_field = required_field.build();

    // THEN
    assert!(
        matches!(nested, Err(SchemaError::Invalid { ref reason, .. }) if reason.contains("optional of optional")),
        "got {nested:?}"
    );
    assert!(
        matches!(optional_field, Err(SchemaError::Invalid { ref reason, .. }) if reason.contains("'text'")),
        "got {optional_field:?}"
    );
    assert!(required_field.is_ok(), "got {required_field:?}");
}

/// **VALUE**: Verifies the fingerprint ignores declaration order but not content.
///
/// **WHY THIS MATTERS**: Both processes build the schema independently; only a
/// real difference in commands, topics or shapes may change the fingerprint.
///
/// **BUG THIS CATCHES**: Would catch hashing in insertion order (false
/// mismatches) or hashing only names (missed shape drift).
#[test]
fn given_equivalent_and_changed_schemas_when_fingerprinting_then_only_changes_differ() {
    // GIVEN
    let forward = Schema::builder("demo", 1)
        .command(sum_spec())
        .command(CommandSpec::new("ping"))
        .build()
        .unwrap();
    let reversed = Schema::builder("demo", 1)
        .command(CommandSpec::new("ping"))
        .command(sum_spec())
        .build()
        .unwrap();
    let widened = Schema::builder("demo", 1)
        .command(sum_spec().arg(FieldSpec::optional("c", Shape::I64)))
        .command(CommandSpec::new("ping"))
        .build()
        .unwrap();

    // THEN
    assert_eq!(forward.fingerprint(), reversed.fingerprint());
    assert_ne!(forward.fingerprint(), widened.fingerprint());
    assert_eq!(forward.fingerprint().len(), 64);
    assert_ne!(forward.token(), widened.token());
}

/// **VALUE**: Verifies a TOML artifact and the builder describe the same schema.
///
/// **WHY THIS MATTERS**: A UI written in another language loads the artifact,
/// while Rust code uses the builder; both must hash identically.
///
/// **BUG THIS CATCHES**: Would catch serde defaults (`required`, `error`,
/// `extra`) that differ between the two paths.
#[test]
fn given_toml_artifact_when_parsing_then_matches_builder_schema() {
    // GIVEN
    let built = Schema::builder("demo", 1)
        .command(
            CommandSpec::new("sum")
                .arg(FieldSpec::required("a", Shape::I64))
                .arg(FieldSpec::required("b", Shape::I64))
                .returns(Shape::I64),
        )
        .event(EventSpec::new(
            "progress",
            Shape::record([FieldSpec::required("pct", Shape::U32)]),
        ))
        .build()
        .unwrap();

    // WHEN
    let parsed = Schema::from_toml_str(SCHEMA_TOML).unwrap();

    // THEN
    assert_eq!(parsed.token(), built.token());
    assert_eq!(parsed.command("sum").unwrap(), built.command("sum").unwrap());
}

/// **VALUE**: Verifies a broken artifact is reported as a parse error.
///
/// **BUG THIS CATCHES**: Would catch unknown shape types being accepted.
#[test]
fn given_unknown_shape_type_when_parsing_toml_then_parse_error() {
    let source = SCHEMA_TOML.replace(r#"type = "u32""#, r#"type = "u128""#);

    let result = Schema::from_toml_str(&source);

    assert!(matches!(result, Err(SchemaError::Parse { .. })));
}

/// **VALUE**: Verifies the token's display form is short and stable.
///
/// **WHY THIS MATTERS**: The token appears in handshake logs and mismatch errors.
#[test]
fn given_schema_when_displaying_token_then_name_version_and_short_fingerprint() {
    let schema = demo_schema();

    let display = schema.token().to_string();

    assert_eq!(
        display,
        format!("demo@v1#{}", &schema.fingerprint()[..12])
    );
}
