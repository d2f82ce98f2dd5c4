//! Command registry: maps command names to handlers on the backend.
//!
//! Every handler is registered against the shared [`Schema`]. The registry
//! refuses names the schema does not declare, specs that differ from the
//! schema's entry, and repeated names. [`CommandRegistry::verify_complete`]
//! checks that every schema command has a handler before the server starts.
//!
//! Dispatch validates arguments before the handler runs. A handler never sees
//! a value that does not fit its argument record, and exactly one Result or
//! Error envelope is produced per Call, even when the handler panics.

mod handler;

pub use handler::{BoxFuture, CommandHandler, HandlerFailure, TypedHandler};

use crate::envelope::{Envelope, EnvelopeKind, WireError};
use crate::error::bridge::BridgeError;
use crate::marshal;
use crate::schema::{CommandSpec, Schema};

use common::ErrorLocation;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub struct CommandRegistry {
    schema: Arc<Schema>,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            handlers: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Register `handler` for `spec`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::DuplicateCommand`] if the name already has a handler
    /// - [`BridgeError::UnknownCommand`] if the schema does not declare it
    /// - [`BridgeError::SchemaMismatch`] if `spec` differs from the schema's entry
    #[track_caller]
    pub fn register(
        &mut self,
        spec: &CommandSpec,
        handler: impl CommandHandler,
    ) -> Result<(), BridgeError> {
        if self.handlers.contains_key(&spec.name) {
            return Err(BridgeError::DuplicateCommand {
                name: spec.name.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        let declared = self.schema.command(&spec.name)?;
        if declared != spec {
            return Err(BridgeError::schema_mismatch(
                spec.name.as_str(),
                "command spec differs from the shared schema",
            ));
        }

        self.handlers.insert(spec.name.clone(), Arc::new(handler));
        debug!("Registered handler for '{}'", spec.name);
        Ok(())
    }

    /// Register a typed async function for the schema command `name`.
    #[track_caller]
    pub fn handle<F, A, R, E, Fut>(&mut self, name: &str, handler: F) -> Result<(), BridgeError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Serialize + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let spec = self.schema.command(name)?.clone();
        self.register(&spec, TypedHandler::new(handler))
    }

    /// Fail with `MissingHandler` for the first schema command without a handler.
    #[track_caller]
    pub fn verify_complete(&self) -> Result<(), BridgeError> {
        if let Some(missing) = self
            .schema
            .commands()
            .find(|spec| !self.handlers.contains_key(&spec.name))
        {
            return Err(BridgeError::MissingHandler {
                name: missing.name.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        info!(
            "Command registry complete: {} handlers for schema {}",
            self.handlers.len(),
            self.schema.token()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run one Call envelope and produce its Result or Error envelope.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedEnvelope`] if `envelope` is not a valid
    /// Call; there is no correlation id to answer in that case.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, BridgeError> {
        let kind = envelope.validate()?;
        let (EnvelopeKind::Call, Some(id), Some(name)) =
            (kind, envelope.correlation_id, envelope.command.as_deref())
        else {
            return Err(BridgeError::malformed(format!(
                "cannot dispatch a {kind:?} envelope"
            )));
        };

        debug!("Dispatching '{name}' (call {id})");
        Ok(match self.run(name, &envelope.payload).await {
            Ok(payload) => Envelope::result(id, payload),
            Err(wire) => {
                debug!("Call {id} to '{name}' failed: {wire:?}");
                Envelope::error(id, &wire)
            }
        })
    }

    async fn run(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, WireError> {
        let unknown = || WireError::UnknownCommand {
            name: name.to_string(),
        };
        let spec = self.schema.command(name).map_err(|_| unknown())?;
        let handler = self.handlers.get(name).ok_or_else(unknown)?;

        let args = marshal::decode_args(&spec.args, payload).map_err(wire_error)?;

        let outcome = AssertUnwindSafe(async move { handler.call(args.value).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => marshal::encode_value(&spec.result, &result).map_err(|e| {
                error!("Handler for '{name}' returned a value outside its result shape: {e}");
                wire_error(e)
            }),
            Ok(Err(HandlerFailure::Failed(error))) => match marshal::to_wire(&spec.error, &error) {
                Ok(error) => Err(WireError::HandlerError { error }),
                Err(e) => {
                    error!("Handler for '{name}' returned an error outside its error shape: {e}");
                    Err(wire_error(e))
                }
            },
            Ok(Err(HandlerFailure::Rejected(e))) => Err(wire_error(e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Handler for '{name}' panicked: {message}");
                Err(WireError::HandlerPanicked { message })
            }
        }
    }
}

fn wire_error(error: BridgeError) -> WireError {
    match error {
        BridgeError::SchemaMismatch { path, message, .. } => {
            WireError::SchemaMismatch { path, message }
        }
        BridgeError::UnknownCommand { name, .. } => WireError::UnknownCommand { name },
        other => WireError::SchemaMismatch {
            path: String::from("$"),
            message: other.to_string(),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("handler panicked")
    }
}
