//! The client actor.
//!
//! One task owns the pending-call table and the subscription registry. It is
//! the only reader of the link's inbound side, so a response can never be
//! processed before its call was registered. Callers talk to it through
//! [`ActorCommand`] messages and wait on oneshot channels; the actor itself
//! never waits on a caller.

use crate::client::Diagnostics;
use crate::envelope::{Envelope, EnvelopeKind, WireError};
use crate::error::bridge::BridgeError;
use crate::marshal;
use crate::schema::Schema;

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde_json::Value;
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep as TokioSleep};

pub(crate) type CallOutcome = Result<Value, BridgeError>;

pub(crate) enum ActorCommand {
    Call {
        envelope: Envelope,
        command: String,
        timeout: Duration,
        reply: oneshot::Sender<CallOutcome>,
    },
    Cancel {
        id: u64,
    },
    Subscribe {
        id: u64,
        topic: String,
        sink: mpsc::UnboundedSender<Value>,
        ack: oneshot::Sender<()>,
    },
    Unsubscribe {
        id: u64,
        ack: Option<oneshot::Sender<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<PendingCallInfo>>,
    },
}

/// Introspection record for one outstanding call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallInfo {
    pub correlation_id: u64,
    pub command: String,
    pub elapsed: Duration,
}

struct PendingEntry {
    command: String,
    created: Instant,
    timeout: Duration,
    timer: AbortHandle,
    reply: oneshot::Sender<CallOutcome>,
}

struct Subscriber {
    topic: String,
    sink: mpsc::UnboundedSender<Value>,
}

pub(crate) struct ClientActor {
    schema: Arc<Schema>,
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    commands: mpsc::UnboundedReceiver<ActorCommand>,
    expiry_tx: mpsc::UnboundedSender<u64>,
    expiry_rx: mpsc::UnboundedReceiver<u64>,
    pending: HashMap<u64, PendingEntry>,
    subscribers: HashMap<u64, Subscriber>,
    diagnostics: Arc<Diagnostics>,
}

impl ClientActor {
    pub(crate) fn new(
        schema: Arc<Schema>,
        outbound: mpsc::UnboundedSender<Envelope>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
        commands: mpsc::UnboundedReceiver<ActorCommand>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        Self {
            schema,
            outbound,
            inbound,
            commands,
            expiry_tx,
            expiry_rx,
            pending: HashMap::new(),
            subscribers: HashMap::new(),
            diagnostics,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Bridge client actor started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All bridge client handles dropped");
                        break;
                    }
                },
                envelope = self.inbound.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(envelope),
                    None => {
                        self.fail_all("transport closed");
                        break;
                    }
                },
                Some(id) = self.expiry_rx.recv() => self.expire(id),
            }
        }

        info!("Bridge client actor stopped");
    }

    fn handle_command(&mut self, command: ActorCommand) {
        match command {
            ActorCommand::Call {
                envelope,
                command,
                timeout,
                reply,
            } => self.start_call(envelope, command, timeout, reply),
            ActorCommand::Cancel { id } => self.cancel(id),
            ActorCommand::Subscribe {
                id,
                topic,
                sink,
                ack,
            } => {
                debug!("Subscription {id} to '{topic}'");
                self.subscribers.insert(id, Subscriber { topic, sink });
                let _ = ack.send(());
            }
            ActorCommand::Unsubscribe { id, ack } => {
                if let Some(subscriber) = self.subscribers.remove(&id) {
                    debug!("Subscription {id} to '{}' ended", subscriber.topic);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            ActorCommand::Snapshot { reply } => {
                let mut calls: Vec<PendingCallInfo> = self
                    .pending
                    .iter()
                    .map(|(id, entry)| PendingCallInfo {
                        correlation_id: *id,
                        command: entry.command.clone(),
                        elapsed: entry.created.elapsed(),
                    })
                    .collect();
                calls.sort_by_key(|call| call.correlation_id);
                let _ = reply.send(calls);
            }
        }
    }

    fn start_call(
        &mut self,
        envelope: Envelope,
        command: String,
        timeout: Duration,
        reply: oneshot::Sender<CallOutcome>,
    ) {
        let Some(id) = envelope.correlation_id else {
            let _ = reply.send(Err(BridgeError::malformed("call without correlation id")));
            return;
        };

        if self.outbound.send(envelope).is_err() {
            let _ = reply.send(Err(BridgeError::transport_failure(
                "link closed before the call was sent",
            )));
            return;
        }

        let expiry = self.expiry_tx.clone();
        let timer = TokioSpawn(async move {
            TokioSleep(timeout).await;
            let _ = expiry.send(id);
        })
        .abort_handle();

        trace!("Call {id} to '{command}' sent");
        self.pending.insert(
            id,
            PendingEntry {
                command,
                created: Instant::now(),
                timeout,
                timer,
                reply,
            },
        );
    }

    fn cancel(&mut self, id: u64) {
        let Some(entry) = self.pending.remove(&id) else {
            return;
        };
        entry.timer.abort();
        self.diagnostics.record_cancelled();
        debug!("Call {id} to '{}' cancelled", entry.command);

        let _ = self.outbound.send(Envelope::cancel(id));
        let _ = entry.reply.send(Err(BridgeError::Cancelled {
            command: entry.command,
            location: ErrorLocation::from(Location::caller()),
        }));
    }

    fn expire(&mut self, id: u64) {
        let Some(entry) = self.pending.remove(&id) else {
            return;
        };
        self.diagnostics.record_timeout();
        let timeout_ms = u64::try_from(entry.timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(
            "Call {id} to '{}' timed out after {timeout_ms} ms",
            entry.command
        );

        let _ = self.outbound.send(Envelope::cancel(id));
        let _ = entry.reply.send(Err(BridgeError::Timeout {
            command: entry.command,
            timeout_ms,
            location: ErrorLocation::from(Location::caller()),
        }));
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        let kind = match envelope.validate() {
            Ok(kind) => kind,
            Err(e) => {
                self.diagnostics.record_malformed();
                warn!("Discarding envelope from backend: {e}");
                return;
            }
        };

        match (kind, envelope.correlation_id) {
            (EnvelopeKind::Result | EnvelopeKind::Error, Some(id)) => {
                self.settle(id, kind, &envelope.payload)
            }
            (EnvelopeKind::Event, _) => self.deliver(envelope),
            (other, _) => {
                self.diagnostics.record_malformed();
                warn!("Discarding unexpected {other:?} envelope from backend");
            }
        }
    }

    fn settle(&mut self, id: u64, kind: EnvelopeKind, payload: &[u8]) {
        let Some(entry) = self.pending.remove(&id) else {
            self.diagnostics.record_unmatched();
            warn!("Discarding {kind:?} for call {id}: no pending call");
            return;
        };
        entry.timer.abort();

        let outcome = if kind == EnvelopeKind::Result {
            self.decode_result(&entry.command, payload)
        } else {
            Err(self.decode_error(&entry.command, payload))
        };

        if entry.reply.send(outcome).is_err() {
            debug!("Call {id} settled after its handle was dropped");
        }
    }

    fn decode_result(&self, command: &str, payload: &[u8]) -> CallOutcome {
        let spec = self.schema.command(command)?;
        Ok(marshal::decode_value(&spec.result, payload)?.value)
    }

    fn decode_error(&self, command: &str, payload: &[u8]) -> BridgeError {
        let wire = match WireError::from_payload(payload) {
            Ok(wire) => wire,
            Err(e) => return e,
        };

        match wire {
            WireError::UnknownCommand { name } => BridgeError::UnknownCommand {
                name,
                location: ErrorLocation::from(Location::caller()),
            },
            WireError::SchemaMismatch { path, message } => BridgeError::SchemaMismatch {
                path,
                message,
                location: ErrorLocation::from(Location::caller()),
            },
            WireError::HandlerError { error } => {
                let decoded = self
                    .schema
                    .command(command)
                    .and_then(|spec| marshal::from_wire(&spec.error, &error));
                match decoded {
                    Ok(decoded) => BridgeError::HandlerError {
                        command: command.to_string(),
                        error: decoded.value,
                        location: ErrorLocation::from(Location::caller()),
                    },
                    Err(e) => e,
                }
            }
            WireError::HandlerPanicked { message } => BridgeError::HandlerPanicked {
                command: command.to_string(),
                message,
                location: ErrorLocation::from(Location::caller()),
            },
        }
    }

    fn deliver(&mut self, envelope: Envelope) {
        let Some(topic) = envelope.topic.as_deref() else {
            return;
        };
        if !self.subscribers.values().any(|s| s.topic == topic) {
            trace!("No subscribers for '{topic}'");
            return;
        }

        let payload = self
            .schema
            .event(topic)
            .and_then(|spec| marshal::decode_value(&spec.payload, &envelope.payload));
        let payload = match payload {
            Ok(decoded) => decoded.value,
            Err(e) => {
                self.diagnostics.record_rejected_event();
                warn!("Rejected '{topic}' event: {e}");
                return;
            }
        };

        self.subscribers.retain(|id, subscriber| {
            if subscriber.topic != topic {
                return true;
            }
            let alive = subscriber.sink.send(payload.clone()).is_ok();
            if !alive {
                debug!("Subscription {id} to '{topic}' dropped its receiver");
            }
            alive
        });
    }

    fn fail_all(&mut self, reason: &str) {
        warn!(
            "Bridge transport lost ({reason}): failing {} pending call(s), ending {} subscription(s)",
            self.pending.len(),
            self.subscribers.len()
        );

        for (_, entry) in self.pending.drain() {
            entry.timer.abort();
            let _ = entry.reply.send(Err(BridgeError::transport_failure(format!(
                "{reason} while '{}' was pending",
                entry.command
            ))));
        }
        self.subscribers.clear();
    }
}
