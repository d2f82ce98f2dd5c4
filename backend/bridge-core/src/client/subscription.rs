//! UI side of the event channel.

use crate::client::actor::ActorCommand;
use crate::error::bridge::BridgeError;
use crate::marshal;

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Lazy, unbounded sequence of payloads published on one topic.
///
/// There is no replay: only events that arrive after
/// [`subscribe`](crate::client::BridgeClient::subscribe) returned are seen.
/// The stream ends when the transport is lost. Dropping the subscription
/// unsubscribes it.
pub struct EventSubscription<T> {
    id: u64,
    topic: String,
    events: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<ActorCommand>,
    active: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> EventSubscription<T> {
    pub(crate) fn new(
        id: u64,
        topic: String,
        events: mpsc::UnboundedReceiver<Value>,
        commands: mpsc::UnboundedSender<ActorCommand>,
    ) -> Self {
        Self {
            id,
            topic,
            events,
            commands,
            active: true,
            _payload: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop receiving events.
    ///
    /// Returns once the client has removed the subscription; no payload
    /// published afterwards is delivered.
    pub async fn unsubscribe(mut self) {
        self.active = false;
        let (ack_tx, ack_rx) = oneshot::channel();
        let request = ActorCommand::Unsubscribe {
            id: self.id,
            ack: Some(ack_tx),
        };
        if self.commands.send(request).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl<T: DeserializeOwned> Stream for EventSubscription<T> {
    type Item = Result<T, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .events
            .poll_recv(cx)
            .map(|payload| payload.map(marshal::into_typed))
    }
}

impl<T> Drop for EventSubscription<T> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.commands.send(ActorCommand::Unsubscribe {
                id: self.id,
                ack: None,
            });
        }
    }
}
