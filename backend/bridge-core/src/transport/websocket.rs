//! WebSocket transport.
//!
//! The backend listens on localhost only and rejects non-loopback peers. Each
//! envelope travels as one binary frame holding its protobuf encoding. Text,
//! ping and pong frames are ignored; a frame that fails to decode ends the
//! link, since the transport is assumed to be corruption-free.
//!
//! # Security
//!
//! - Binds to `127.0.0.1` only
//! - Non-loopback connections are dropped before the WebSocket upgrade
//! - The auth token is checked in the bridge handshake, not here

use crate::envelope::Envelope;
use crate::error::ipc::IpcError;
use crate::server::BridgeServer;
use crate::transport::Link;
use crate::{IPC_HOSTNAME, IPC_URL_PREFIX};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async, connect_async};
use url::Url;

/// Handle to a running IPC WebSocket server.
///
/// Dropping the handle stops accepting new connections. Connections already
/// accepted keep running until their peer disconnects.
pub struct IpcServerHandle {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl IpcServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL a UI process connects to.
    pub fn url(&self) -> String {
        ipc_url(self.local_addr.port())
    }
}

impl Drop for IpcServerHandle {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// `ws://127.0.0.1:<port>`
pub fn ipc_url(port: u16) -> String {
    format!("{IPC_URL_PREFIX}:{port}")
}

/// Start the IPC WebSocket server on `127.0.0.1:<ipc_port>`.
///
/// Port 0 binds an ephemeral port; read it back from
/// [`IpcServerHandle::local_addr`].
///
/// # Errors
///
/// Returns [`IpcError::Io`] if the port is in use or cannot be bound.
pub async fn start_ipc_server(
    ipc_port: u16,
    server: BridgeServer,
) -> Result<IpcServerHandle, IpcError> {
    let listener = TcpListener::bind((IPC_HOSTNAME, ipc_port)).await?;
    let local_addr = listener.local_addr()?;

    info!("IPC server listening on {local_addr}");

    let accept_task = TokioSpawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Client connecting from {addr}");
                    TokioSpawn(handle_connection(stream, addr, server.clone()));
                }
                Err(e) => {
                    error!("IPC accept failed: {e}");
                    break;
                }
            }
        }
    });

    Ok(IpcServerHandle {
        local_addr,
        accept_task,
    })
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, server: BridgeServer) {
    // SECURITY: Reject non-loopback connections
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            error!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    match server.serve(link_from_socket(ws_stream)).await {
        Ok(()) => info!("Client {addr} disconnected"),
        Err(e) => warn!("Client {addr} rejected: {e}"),
    }
}

/// Connect to a bridge backend, retrying with exponential backoff while it
/// starts up.
///
/// # Errors
///
/// - [`IpcError::Connect`] for a URL that is not `ws://`
/// - [`IpcError::Connect`] when no connection succeeds within `max_elapsed`
pub async fn connect(url: &str, max_elapsed: Duration) -> Result<Link, IpcError> {
    let parsed = Url::parse(url).map_err(|e| IpcError::Connect {
        message: format!("Invalid IPC URL '{url}': {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    if parsed.scheme() != "ws" {
        return Err(IpcError::Connect {
            message: format!("IPC URL must use ws://, got '{url}'"),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    loop {
        match connect_async(parsed.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Connected to IPC server at {parsed}");
                return Ok(link_from_socket(ws_stream));
            }
            Err(e) => match backoff.next_backoff() {
                Some(duration) => {
                    trace!("IPC server not ready ({e}), retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    return Err(IpcError::Connect {
                        message: format!(
                            "Could not connect to {parsed} within {max_elapsed:?}: {e}"
                        ),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            },
        }
    }
}

/// Pump a WebSocket into a [`Link`] with one reader and one writer task.
fn link_from_socket<S>(ws_stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

    TokioSpawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = write.send(Message::Binary(envelope.to_frame().into())).await {
                error!(
                    "{}",
                    IpcError::Send {
                        message: format!("Failed to send IPC frame: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    }
                );
                break;
            }
        }
        let _ = write.close().await;
        debug!("IPC writer stopped");
    });

    TokioSpawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Binary(data)) => match Envelope::from_frame(&data[..]) {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Dropping IPC link: {}", IpcError::from(e));
                        break;
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => trace!("Ignoring non-binary IPC frame"),
                Err(e) => {
                    error!(
                        "{}",
                        IpcError::Read {
                            message: format!("Error reading IPC frame: {e}"),
                            location: ErrorLocation::from(Location::caller()),
                        }
                    );
                    break;
                }
            }
        }
        debug!("IPC reader stopped");
    });

    Link::new(outbound_tx, inbound_rx)
}
