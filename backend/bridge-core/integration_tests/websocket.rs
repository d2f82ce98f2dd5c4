// The bridge over a real localhost WebSocket

use crate::helpers::{Progress, SumArgs, demo_schema, demo_server, test_config};

use bridge_core::client::{BridgeClient, ClientConfig};
use bridge_core::config::BridgeConfig;
use bridge_core::error::{BridgeError, IpcError};
use bridge_core::transport::websocket::{connect, ipc_url, start_ipc_server};

use common::RedactedToken;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::net::TcpListener;

const CONNECT_WINDOW: Duration = Duration::from_secs(2);

/// **VALUE**: Verifies calls and events work end to end over the WebSocket
/// transport.
///
/// **WHY THIS MATTERS**: Envelopes must survive protobuf framing in both
/// directions, and events must share the link with responses.
#[tokio::test]
async fn given_ipc_server_when_client_connects_then_calls_and_events_flow() {
    // GIVEN
    let schema = demo_schema();
    let server = demo_server(Arc::clone(&schema));
    let publisher = server.publisher().clone();
    let handle = start_ipc_server(0, server).await.unwrap();
    assert_eq!(handle.url(), ipc_url(handle.local_addr().port()));

    let config = BridgeConfig::default();
    let link = connect(&handle.url(), config.connect_max_elapsed())
        .await
        .unwrap();
    let client = BridgeClient::connect(link, schema, config.client_config())
        .await
        .unwrap();
    let mut progress = client.subscribe::<Progress>("progress").await.unwrap();

    // WHEN
    let result: i64 = client.call("sum", &SumArgs { a: 2, b: 3 }).await.unwrap();
    let links = publisher
        .publish(
            "progress",
            &Progress {
                pct: 42,
                job_id: Some("job-1".to_string()),
            },
        )
        .await
        .unwrap();

    // THEN
    assert_eq!(result, 5);
    assert_eq!(links, 1);
    let event = progress.next().await.unwrap().unwrap();
    assert_eq!(event.pct, 42);
    assert_eq!(event.job_id.as_deref(), Some("job-1"));
}

/// **VALUE**: Verifies the backend's auth token gates the handshake.
///
/// **BUG THIS CATCHES**: Would catch a backend that accepts any local process
/// once a token is configured.
#[tokio::test]
async fn given_auth_token_when_client_presents_wrong_token_then_handshake_rejected() {
    // GIVEN
    let schema = demo_schema();
    let server = demo_server(Arc::clone(&schema)).with_auth_token(RedactedToken::new("s3cret"));
    let handle = start_ipc_server(0, server).await.unwrap();

    // WHEN
    let wrong = BridgeClient::connect(
        connect(&handle.url(), CONNECT_WINDOW).await.unwrap(),
        Arc::clone(&schema),
        ClientConfig {
            auth_token: Some(RedactedToken::new("guess")),
            ..test_config()
        },
    )
    .await;
    let right = BridgeClient::connect(
        connect(&handle.url(), CONNECT_WINDOW).await.unwrap(),
        schema,
        ClientConfig {
            auth_token: Some(RedactedToken::new("s3cret")),
            ..test_config()
        },
    )
    .await;

    // THEN
    assert!(matches!(wrong, Err(BridgeError::Handshake { .. })));
    let client = right.unwrap();
    let result: i64 = client.call("sum", &SumArgs { a: 1, b: 1 }).await.unwrap();
    assert_eq!(result, 2);
}

/// **VALUE**: Verifies connecting to a port nobody listens on gives up after
/// the configured retry window.
///
/// **BUG THIS CATCHES**: Would catch `[calls] connect_max_elapsed_ms` being
/// ignored and the UI retrying for the default five seconds.
#[tokio::test]
async fn given_closed_port_when_connecting_then_connect_error() {
    // GIVEN
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = BridgeConfig::default();
    config.calls.connect_max_elapsed_ms = 200;

    // WHEN
    let started = Instant::now();
    let result = connect(&ipc_url(port), config.connect_max_elapsed()).await;

    // THEN
    assert!(matches!(result, Err(IpcError::Connect { .. })));
    assert!(started.elapsed() < Duration::from_secs(4), "{:?}", started.elapsed());
}

/// **VALUE**: Verifies only `ws://` URLs are accepted.
#[tokio::test]
async fn given_http_url_when_connecting_then_connect_error() {
    let result = connect("http://127.0.0.1:1", CONNECT_WINDOW).await;

    assert!(matches!(result, Err(IpcError::Connect { .. })));
}

/// **VALUE**: Verifies the server stops accepting once its handle is dropped.
#[tokio::test]
async fn given_dropped_server_handle_when_connecting_then_connect_error() {
    let handle = start_ipc_server(0, demo_server(demo_schema()))
        .await
        .unwrap();
    let url = handle.url();

    drop(handle);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = connect(&url, Duration::from_millis(200)).await;
    assert!(matches!(result, Err(IpcError::Connect { .. })));
}
