//! In-process transport.

use crate::transport::Link;

use tokio::sync::mpsc;

/// Create two connected links: `(ui_end, backend_end)`.
///
/// Dropping either end closes the other end's inbound side, which the bridge
/// treats as transport loss.
pub fn pair() -> (Link, Link) {
    let (ui_tx, backend_rx) = mpsc::unbounded_channel();
    let (backend_tx, ui_rx) = mpsc::unbounded_channel();
    (Link::new(ui_tx, ui_rx), Link::new(backend_tx, backend_rx))
}
