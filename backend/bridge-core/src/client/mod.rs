//! UI end of the bridge: the invocation client and event subscriptions.
//!
//! [`BridgeClient::connect`] performs the handshake over a [`Link`] and then
//! hands the link to a single actor task that owns every pending call and
//! subscription. The client handle is cheap to clone; all clones share the
//! actor.
//!
//! # Calls
//!
//! [`BridgeClient::invoke`] validates the command name and arguments against
//! the local schema before anything is sent, so `UnknownCommand` and argument
//! `SchemaMismatch` errors never cross the boundary. Each call has a timeout;
//! when it fires the call rejects with `Timeout`, its entry is removed, and a
//! late response is discarded and counted in [`ClientDiagnostics`].
//!
//! # Transport loss
//!
//! There is no reconnect. When the link closes every pending call rejects with
//! `TransportFailure`, every subscription ends, and later calls fail at once.

mod actor;
mod call;
mod subscription;

pub use actor::PendingCallInfo;
pub use call::PendingCall;
pub use subscription::EventSubscription;

use crate::envelope::Envelope;
use crate::error::bridge::BridgeError;
use crate::handshake::{self, Hello, HelloAck};
use crate::marshal;
use crate::schema::Schema;
use crate::transport::Link;

use actor::{ActorCommand, ClientActor};

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout as TokioTimeout;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default bound on the backend's handshake reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub call_timeout: Duration,
    pub handshake_timeout: Duration,
    pub auth_token: Option<RedactedToken>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            auth_token: None,
        }
    }
}

/// Snapshot of the client's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientDiagnostics {
    /// Results or errors whose correlation id matched no pending call.
    pub unmatched_envelopes: u64,
    /// Envelopes that failed validation or had an unexpected kind.
    pub malformed_envelopes: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    /// Event payloads that did not fit their topic's shape.
    pub rejected_events: u64,
}

#[derive(Default)]
pub(crate) struct Diagnostics {
    unmatched: AtomicU64,
    malformed: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
    rejected_events: AtomicU64,
}

impl Diagnostics {
    pub(crate) fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_event(&self) {
        self.rejected_events.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClientDiagnostics {
        ClientDiagnostics {
            unmatched_envelopes: self.unmatched.load(Ordering::Relaxed),
            malformed_envelopes: self.malformed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected_events: self.rejected_events.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    schema: Arc<Schema>,
    call_timeout: Duration,
    commands: mpsc::UnboundedSender<ActorCommand>,
    next_call: AtomicU64,
    next_subscription: AtomicU64,
    diagnostics: Arc<Diagnostics>,
}

impl BridgeClient {
    /// Handshake over `link` and start the client actor.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::SchemaVersionMismatch`] if the backend runs a different
    ///   schema or protocol version
    /// - [`BridgeError::Handshake`] if the backend rejects the link, replies
    ///   with something else, or does not reply within the handshake timeout
    /// - [`BridgeError::TransportFailure`] if the link closes first
    pub async fn connect(
        link: Link,
        schema: Arc<Schema>,
        config: ClientConfig,
    ) -> Result<Self, BridgeError> {
        let (outbound, mut inbound) = link.into_parts();
        let local = schema.token();

        outbound
            .send(Hello::new(local.clone(), config.auth_token.as_ref()).to_envelope())
            .map_err(|_| BridgeError::transport_failure("link closed before handshake"))?;

        let reply: Envelope = TokioTimeout(config.handshake_timeout, inbound.recv())
            .await
            .map_err(|_| BridgeError::Handshake {
                message: format!("no handshake reply within {:?}", config.handshake_timeout),
                location: ErrorLocation::from(Location::caller()),
            })?
            .ok_or_else(|| BridgeError::transport_failure("link closed during handshake"))?;

        let ack = HelloAck::from_envelope(&reply)?;
        handshake::verify_ack(&ack, &local)?;
        info!("Bridge connected with schema {local}");

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let diagnostics = Arc::new(Diagnostics::default());
        let actor = ClientActor::new(
            Arc::clone(&schema),
            outbound,
            inbound,
            commands_rx,
            Arc::clone(&diagnostics),
        );
        TokioSpawn(actor.run());

        Ok(Self {
            inner: Arc::new(ClientInner {
                schema,
                call_timeout: config.call_timeout,
                commands,
                next_call: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                diagnostics,
            }),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Issue a call with the default timeout.
    ///
    /// # Errors
    ///
    /// Fails locally, without sending anything, with `UnknownCommand` for a
    /// name the schema does not declare, `SchemaMismatch` for arguments that
    /// do not fit the argument record, or `TransportFailure` once the
    /// transport is gone.
    pub fn invoke<A, R>(&self, name: &str, args: &A) -> Result<PendingCall<R>, BridgeError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke_with_timeout(name, args, self.inner.call_timeout)
    }

    pub fn invoke_with_timeout<A, R>(
        &self,
        name: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<PendingCall<R>, BridgeError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let spec = self.inner.schema.command(name)?;
        let payload = marshal::encode_args(&spec.args, args)?;
        let id = self.inner.next_call.fetch_add(1, Ordering::Relaxed);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .commands
            .send(ActorCommand::Call {
                envelope: Envelope::call(id, name, payload),
                command: name.to_string(),
                timeout,
                reply: reply_tx,
            })
            .map_err(|_| BridgeError::transport_failure("bridge is closed"))?;

        Ok(PendingCall::new(
            id,
            name.to_string(),
            reply_rx,
            self.inner.commands.clone(),
        ))
    }

    /// Call `name` and wait for its typed result.
    pub async fn call<A, R>(&self, name: &str, args: &A) -> Result<R, BridgeError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke(name, args)?.await
    }

    /// Call `name` with a timeout that overrides the configured default.
    pub async fn call_with_timeout<A, R>(
        &self,
        name: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R, BridgeError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke_with_timeout(name, args, timeout)?.await
    }

    /// Subscribe to `topic`.
    ///
    /// Returns once the subscription is registered, so every event that
    /// arrives afterwards is delivered.
    ///
    /// # Errors
    ///
    /// `UnknownTopic` for a topic the schema does not declare, or
    /// `TransportFailure` once the transport is gone.
    pub async fn subscribe<T: DeserializeOwned>(
        &self,
        topic: &str,
    ) -> Result<EventSubscription<T>, BridgeError> {
        self.inner.schema.event(topic)?;
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (sink, events) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();

        self.inner
            .commands
            .send(ActorCommand::Subscribe {
                id,
                topic: topic.to_string(),
                sink,
                ack: ack_tx,
            })
            .map_err(|_| BridgeError::transport_failure("bridge is closed"))?;
        ack_rx
            .await
            .map_err(|_| BridgeError::transport_failure("bridge closed while subscribing"))?;

        Ok(EventSubscription::new(
            id,
            topic.to_string(),
            events,
            self.inner.commands.clone(),
        ))
    }

    /// Outstanding calls, oldest first. Empty once the bridge is closed.
    pub async fn pending_calls(&self) -> Vec<PendingCallInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(ActorCommand::Snapshot { reply: reply_tx })
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub fn diagnostics(&self) -> ClientDiagnostics {
        self.inner.diagnostics.snapshot()
    }

    /// True once the transport is gone and no further calls can be made.
    pub fn is_closed(&self) -> bool {
        self.inner.commands.is_closed()
    }
}
