//! Handle for one outstanding call.

use crate::client::actor::{ActorCommand, CallOutcome};
use crate::error::bridge::BridgeError;
use crate::marshal;

use common::ErrorLocation;

use std::future::Future;
use std::marker::PhantomData;
use std::panic::Location;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

/// Resolves to the typed result of a call or rejects with a [`BridgeError`].
///
/// Dropping an unsettled `PendingCall` cancels it: the entry is removed from
/// the pending table and the backend is asked to abort the handler.
#[must_use = "a call is cancelled when its PendingCall is dropped"]
pub struct PendingCall<R> {
    id: u64,
    command: String,
    reply: oneshot::Receiver<CallOutcome>,
    commands: mpsc::UnboundedSender<ActorCommand>,
    settled: bool,
    _result: PhantomData<fn() -> R>,
}

impl<R> PendingCall<R> {
    pub(crate) fn new(
        id: u64,
        command: String,
        reply: oneshot::Receiver<CallOutcome>,
        commands: mpsc::UnboundedSender<ActorCommand>,
    ) -> Self {
        Self {
            id,
            command,
            reply,
            commands,
            settled: false,
            _result: PhantomData,
        }
    }

    pub fn correlation_id(&self) -> u64 {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Cancel the call. A response that arrives later is discarded.
    pub fn cancel(mut self) {
        self.request_cancel();
    }

    fn request_cancel(&mut self) {
        if !self.settled {
            self.settled = true;
            let _ = self.commands.send(ActorCommand::Cancel { id: self.id });
        }
    }
}

impl<R: DeserializeOwned> Future for PendingCall<R> {
    type Output = Result<R, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Polled again after completion.
        if this.settled {
            return Poll::Ready(Err(BridgeError::Cancelled {
                command: this.command.clone(),
                location: ErrorLocation::from(Location::caller()),
            }));
        }

        match Pin::new(&mut this.reply).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                this.settled = true;
                Poll::Ready(match outcome {
                    Ok(Ok(value)) => marshal::into_typed(value),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(BridgeError::transport_failure(
                        "bridge closed before the call settled",
                    )),
                })
            }
        }
    }
}

impl<R> Drop for PendingCall<R> {
    fn drop(&mut self) {
        self.request_cancel();
    }
}
