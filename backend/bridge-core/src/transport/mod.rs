//! Transport boundary.
//!
//! The bridge only needs an ordered, reliable pipe of envelopes in each
//! direction. A [`Link`] is that pipe seen from one end: an outbound sender and
//! an inbound receiver. The inbound side ending (`recv()` returning `None`)
//! means the transport is lost.
//!
//! - [`memory`]: two linked ends inside one process (tests, embedding)
//! - [`websocket`]: binary protobuf frames over a localhost WebSocket

pub mod memory;
pub mod websocket;

use crate::envelope::Envelope;

use tokio::sync::mpsc;

/// One end of a bidirectional envelope transport.
pub struct Link {
    pub(crate) outbound: mpsc::UnboundedSender<Envelope>,
    pub(crate) inbound: mpsc::UnboundedReceiver<Envelope>,
}

impl Link {
    /// Assemble a link from raw channel halves.
    ///
    /// Sends on `outbound` must never block; the bridge publishes events and
    /// responses without waiting on the peer.
    pub fn new(
        outbound: mpsc::UnboundedSender<Envelope>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<Envelope>,
        mpsc::UnboundedReceiver<Envelope>,
    ) {
        (self.outbound, self.inbound)
    }
}
