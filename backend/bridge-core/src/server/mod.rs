//! Backend end of the bridge.
//!
//! [`BridgeServer::serve`] drives one link: it runs the handshake, then reads
//! envelopes in arrival order. Each Call runs in its own task so a slow
//! handler never stalls the link; Cancel aborts the matching task. Responses
//! and events share the link's outbound queue.

mod publisher;

pub use publisher::EventPublisher;

use crate::PROTOCOL_VERSION;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::bridge::BridgeError;
use crate::handshake::{self, Hello, HelloAck};
use crate::registry::CommandRegistry;
use crate::transport::Link;

use common::{ErrorLocation, RedactedToken};

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout as TokioTimeout;

/// How long the backend waits for the UI's handshake by default.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Clone)]
pub struct BridgeServer {
    registry: Arc<CommandRegistry>,
    publisher: EventPublisher,
    auth_token: Option<Arc<RedactedToken>>,
    handshake_timeout: Duration,
}

impl BridgeServer {
    /// Build a server from a complete registry.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::MissingHandler`] if a schema command has no handler
    /// - [`BridgeError::SchemaVersionMismatch`] if the publisher was built for
    ///   a different schema than the registry
    pub fn new(registry: CommandRegistry, publisher: EventPublisher) -> Result<Self, BridgeError> {
        registry.verify_complete()?;
        let local = registry.schema().token();
        let events = publisher.schema().token();
        if local != events {
            return Err(BridgeError::SchemaVersionMismatch {
                local: local.to_string(),
                remote: events.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Self {
            registry: Arc::new(registry),
            publisher,
            auth_token: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Require every link to present `token` in its handshake.
    pub fn with_auth_token(mut self, token: RedactedToken) -> Self {
        self.auth_token = Some(Arc::new(token));
        self
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Serve one link until the peer goes away.
    ///
    /// In-flight handlers are aborted when the link closes.
    ///
    /// # Errors
    ///
    /// Fails only during the handshake: timeout, a first envelope that is not
    /// a valid handshake, a bad auth token or a schema mismatch. The rejection
    /// is acknowledged to the peer before returning.
    pub async fn serve(&self, link: Link) -> Result<(), BridgeError> {
        let (outbound, mut inbound) = link.into_parts();
        self.handshake(&outbound, &mut inbound).await?;

        let (connection, events) = self.publisher.attach().await;
        self.run(outbound, inbound, events).await;
        self.publisher.detach(connection).await;
        Ok(())
    }

    async fn handshake(
        &self,
        outbound: &mpsc::UnboundedSender<Envelope>,
        inbound: &mut mpsc::UnboundedReceiver<Envelope>,
    ) -> Result<(), BridgeError> {
        let local = self.registry.schema().token();

        let first = TokioTimeout(self.handshake_timeout, inbound.recv())
            .await
            .map_err(|_| BridgeError::Handshake {
                message: format!("no handshake within {:?}", self.handshake_timeout),
                location: ErrorLocation::from(Location::caller()),
            })?
            .ok_or_else(|| BridgeError::transport_failure("link closed before handshake"))?;

        let (ack, rejection) = match Hello::from_envelope(&first) {
            Ok(hello) => handshake::evaluate(&hello, &local, self.auth_token.as_deref()),
            Err(e) => {
                let ack = HelloAck {
                    accepted: false,
                    protocol_version: PROTOCOL_VERSION,
                    schema: local.clone(),
                    reason: Some(e.to_string()),
                };
                (ack, Some(e))
            }
        };

        let _ = outbound.send(ack.to_envelope());
        match rejection {
            Some(e) => {
                warn!("Rejected link: {e}");
                Err(e)
            }
            None => {
                info!("Link accepted for schema {local}");
                Ok(())
            }
        }
    }

    async fn run(
        &self,
        outbound: mpsc::UnboundedSender<Envelope>,
        mut inbound: mpsc::UnboundedReceiver<Envelope>,
        mut events: mpsc::UnboundedReceiver<Envelope>,
    ) {
        let mut in_flight = InFlight::default();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<u64>();

        loop {
            tokio::select! {
                Some(id) = done_rx.recv() => {
                    in_flight.0.remove(&id);
                }
                Some(event) = events.recv() => {
                    let _ = outbound.send(event);
                }
                envelope = inbound.recv() => {
                    let Some(envelope) = envelope else { break };
                    self.route(envelope, &outbound, &done_tx, &mut in_flight);
                }
            }
        }

        if !in_flight.0.is_empty() {
            info!("Link closed, aborting {} in-flight call(s)", in_flight.0.len());
        }
    }

    fn route(
        &self,
        envelope: Envelope,
        outbound: &mpsc::UnboundedSender<Envelope>,
        done_tx: &mpsc::UnboundedSender<u64>,
        in_flight: &mut InFlight,
    ) {
        let kind = match envelope.validate() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Discarding envelope: {e}");
                return;
            }
        };

        match (kind, envelope.correlation_id) {
            (EnvelopeKind::Call, Some(id)) => {
                if in_flight.0.contains_key(&id) {
                    warn!("Ignoring duplicate call {id} while the first is in flight");
                    return;
                }

                let registry = Arc::clone(&self.registry);
                let outbound = outbound.clone();
                let done = done_tx.clone();
                let task = TokioSpawn(async move {
                    match registry.dispatch(envelope).await {
                        Ok(response) => {
                            let _ = outbound.send(response);
                        }
                        Err(e) => warn!("Call {id} not dispatched: {e}"),
                    }
                    let _ = done.send(id);
                });
                in_flight.0.insert(id, task.abort_handle());
            }
            (EnvelopeKind::Cancel, Some(id)) => match in_flight.0.remove(&id) {
                Some(task) => {
                    task.abort();
                    debug!("Call {id} cancelled by the UI");
                }
                None => debug!("Cancel for call {id} that is no longer running"),
            },
            (other, _) => warn!("Unexpected {other:?} envelope from the UI"),
        }
    }
}

/// Handler tasks of one link, aborted when the link's loop ends or is dropped.
#[derive(Default)]
struct InFlight(HashMap<u64, AbortHandle>);

impl Drop for InFlight {
    fn drop(&mut self) {
        for (_, task) in self.0.drain() {
            task.abort();
        }
    }
}
