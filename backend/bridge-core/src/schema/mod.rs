//! Shared schema: the single artifact both processes load.
//!
//! A [`Schema`] enumerates every command (argument record, result shape, error
//! shape) and every event topic (payload shape). Each side builds or loads the
//! same schema and exchanges its [`SchemaToken`] during the handshake; any
//! difference in name, version or fingerprint stops the bridge before it
//! becomes operational.
//!
//! # Fingerprint
//!
//! The fingerprint is the SHA-256 of the canonical JSON rendering of the schema
//! (commands and topics sorted by name). Any change to a command, topic or shape
//! changes it, so two builds that disagree on a single field cannot talk to
//! each other even if someone forgot to bump `version`.

pub mod shape;
pub mod spec;

pub use shape::{ExtraFields, FieldSpec, RecordShape, Shape, VariantCase, VariantShape};
pub use spec::{CommandSpec, EventSpec};

use crate::error::bridge::BridgeError;
use crate::error::schema::SchemaError;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a schema as exchanged during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaToken {
    pub name: String,
    pub version: u32,
    pub fingerprint: String,
}

impl fmt::Display for SchemaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}@v{}#{}", self.name, self.version, short)
    }
}

/// On-disk / canonical form of a schema.
#[derive(Debug, Serialize, Deserialize)]
struct SchemaDocument {
    name: String,
    version: u32,
    #[serde(default)]
    commands: Vec<CommandSpec>,
    #[serde(default)]
    events: Vec<EventSpec>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    version: u32,
    commands: BTreeMap<String, CommandSpec>,
    events: BTreeMap<String, EventSpec>,
    fingerprint: String,
}

impl Schema {
    pub fn builder(name: impl Into<String>, version: u32) -> SchemaBuilder {
        SchemaBuilder::new(name, version)
    }

    /// Parse a schema from its TOML artifact.
    ///
    /// ```toml
    /// name = "demo"
    /// version = 1
    ///
    /// [[commands]]
    /// name = "sum"
    /// result = { type = "i64" }
    /// args.fields = [
    ///     { name = "a", shape = { type = "i64" } },
    ///     { name = "b", shape = { type = "i64" } },
    /// ]
    ///
    /// [[events]]
    /// topic = "progress"
    /// payload = { type = "record", of = { fields = [{ name = "pct", shape = { type = "u32" } }] } }
    /// ```
    #[track_caller]
    pub fn from_toml_str(source: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument =
            toml::from_str(source).map_err(|e| SchemaError::Parse {
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut builder = SchemaBuilder::new(document.name, document.version);
        for command in document.commands {
            builder = builder.command(command);
        }
        for event in document.events {
            builder = builder.event(event);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn token(&self) -> SchemaToken {
        SchemaToken {
            name: self.name.clone(),
            version: self.version,
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Look up a command, failing with `UnknownCommand`.
    #[track_caller]
    pub fn command(&self, name: &str) -> Result<&CommandSpec, BridgeError> {
        self.commands
            .get(name)
            .ok_or_else(|| BridgeError::UnknownCommand {
                name: name.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Look up an event topic, failing with `UnknownTopic`.
    #[track_caller]
    pub fn event(&self, topic: &str) -> Result<&EventSpec, BridgeError> {
        self.events
            .get(topic)
            .ok_or_else(|| BridgeError::UnknownTopic {
                topic: topic.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Commands in name order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    /// Topics in name order.
    pub fn events(&self) -> impl Iterator<Item = &EventSpec> {
        self.events.values()
    }
}

/// Collects commands and topics, then validates them into a [`Schema`].
pub struct SchemaBuilder {
    name: String,
    version: u32,
    commands: Vec<CommandSpec>,
    events: Vec<EventSpec>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            commands: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn event(mut self, spec: EventSpec) -> Self {
        self.events.push(spec);
        self
    }

    /// Validate names and shapes and compute the fingerprint.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::Invalid`] for an empty schema name, version 0, a name
    ///   containing whitespace, or a malformed shape
    /// - [`SchemaError::Duplicate`] for a repeated command name or topic
    #[track_caller]
    pub fn build(self) -> Result<Schema, SchemaError> {
        check_name("schema", &self.name)?;
        if self.version == 0 {
            return Err(SchemaError::Invalid {
                reason: String::from("schema version must be at least 1"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mut commands = BTreeMap::new();
        for spec in self.commands {
            check_name("command", &spec.name)?;
            spec.args.check_well_formed(&format!("{}.args", spec.name))?;
            spec.result
                .check_well_formed(&format!("{}.result", spec.name))?;
            spec.error.check_well_formed(&format!("{}.error", spec.name))?;
            if commands.contains_key(&spec.name) {
                return Err(SchemaError::Duplicate {
                    kind: "command",
                    name: spec.name,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            commands.insert(spec.name.clone(), spec);
        }

        let mut events = BTreeMap::new();
        for spec in self.events {
            check_name("topic", &spec.topic)?;
            spec.payload.check_well_formed(&spec.topic)?;
            if events.contains_key(&spec.topic) {
                return Err(SchemaError::Duplicate {
                    kind: "topic",
                    name: spec.topic,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            events.insert(spec.topic.clone(), spec);
        }

        let fingerprint = fingerprint(&self.name, self.version, &commands, &events)?;
        debug!(
            "Schema {}@v{} built: {} commands, {} topics",
            self.name,
            self.version,
            commands.len(),
            events.len()
        );

        Ok(Schema {
            name: self.name,
            version: self.version,
            commands,
            events,
            fingerprint,
        })
    }
}

#[track_caller]
fn check_name(kind: &str, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(SchemaError::Invalid {
            reason: format!("invalid {kind} name '{name}'"),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(())
}

#[track_caller]
fn fingerprint(
    name: &str,
    version: u32,
    commands: &BTreeMap<String, CommandSpec>,
    events: &BTreeMap<String, EventSpec>,
) -> Result<String, SchemaError> {
    let document = SchemaDocument {
        name: name.to_string(),
        version,
        commands: commands.values().cloned().collect(),
        events: events.values().cloned().collect(),
    };
    let canonical = serde_json::to_vec(&document).map_err(|e| SchemaError::Invalid {
        reason: format!("schema is not serializable: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
