//! Backend side of the event channel.

use crate::envelope::Envelope;
use crate::error::bridge::BridgeError;
use crate::marshal;
use crate::schema::Schema;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

/// Publishes typed events to every connected UI link.
///
/// Clone it into whatever background work produces events. Publishing never
/// waits on a subscriber: each payload is queued for every attached link and
/// the call returns. Links that went away are pruned.
#[derive(Clone)]
pub struct EventPublisher {
    schema: Arc<Schema>,
    connections: Arc<RwLock<HashMap<u64, mpsc::UnboundedSender<Envelope>>>>,
    next_connection: Arc<AtomicU64>,
}

impl EventPublisher {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Encode `payload` against the topic's shape and push it to every link.
    ///
    /// Returns the number of links the event was queued on. Zero links is
    /// not an error.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownTopic`] if the schema does not declare `topic`
    /// - [`BridgeError::SchemaMismatch`] if `payload` does not fit the topic's shape
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<usize, BridgeError> {
        let spec = self.schema.event(topic)?;
        let bytes = marshal::encode(&spec.payload, payload)?;

        let mut closed = Vec::new();
        let mut delivered = 0;
        for (id, events) in self.connections.read().await.iter() {
            if events.send(Envelope::event(topic, bytes.clone())).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        if !closed.is_empty() {
            let mut connections = self.connections.write().await;
            for id in closed {
                connections.remove(&id);
                debug!("Event link {id} pruned");
            }
        }

        trace!("Published '{topic}' to {delivered} link(s)");
        Ok(delivered)
    }

    /// Number of links currently receiving events.
    pub async fn connection_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|events| !events.is_closed())
            .count()
    }

    /// Register a link. Events for it arrive on the returned receiver; dropping
    /// the receiver detaches the link on the next publish.
    pub(crate) async fn attach(&self) -> (u64, mpsc::UnboundedReceiver<Envelope>) {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(id, events_tx);
        debug!("Event link {id} attached");
        (id, events_rx)
    }

    pub(crate) async fn detach(&self, id: u64) {
        if self.connections.write().await.remove(&id).is_some() {
            debug!("Event link {id} detached");
        }
    }
}
