//! Test helpers for bridge integration tests.
//!
//! - A demo schema with `sum`, `slow_op` and the `progress` topic
//! - A complete backend (registry + publisher) served over an in-memory link
//! - A scripted backend that lets a test send arbitrary envelopes to a client

use bridge_core::client::{BridgeClient, ClientConfig};
use bridge_core::envelope::{Envelope, EnvelopeKind};
use bridge_core::error::BridgeError;
use bridge_core::handshake::{self, Hello};
use bridge_core::registry::CommandRegistry;
use bridge_core::schema::{CommandSpec, EventSpec, FieldSpec, Schema, Shape, VariantCase};
use bridge_core::server::{BridgeServer, EventPublisher};
use bridge_core::transport::memory;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TEST_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumArgs {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MathError {
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowOpArgs {
    pub millis: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub pct: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

pub fn demo_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("demo", 1)
            .command(
                CommandSpec::new("sum")
                    .arg(FieldSpec::required("a", Shape::I64))
                    .arg(FieldSpec::required("b", Shape::I64))
                    .returns(Shape::I64)
                    .fails_with(Shape::variant([VariantCase::unit("Overflow")])),
            )
            .command(CommandSpec::new("slow_op").arg(FieldSpec::required("millis", Shape::U64)))
            .event(EventSpec::new(
                "progress",
                Shape::record([
                    FieldSpec::required("pct", Shape::U32),
                    FieldSpec::optional("job_id", Shape::String),
                ]),
            ))
            .build()
            .expect("demo schema must build"),
    )
}

pub async fn sum(args: SumArgs) -> Result<i64, MathError> {
    args.a.checked_add(args.b).ok_or(MathError::Overflow)
}

pub async fn slow_op(args: SlowOpArgs) -> Result<(), MathError> {
    tokio::time::sleep(Duration::from_millis(args.millis)).await;
    Ok(())
}

pub fn demo_server(schema: Arc<Schema>) -> BridgeServer {
    let mut registry = CommandRegistry::new(Arc::clone(&schema));
    registry.handle("sum", sum).unwrap();
    registry.handle("slow_op", slow_op).unwrap();
    BridgeServer::new(registry, EventPublisher::new(schema)).expect("registry is complete")
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        call_timeout: TEST_CALL_TIMEOUT,
        ..ClientConfig::default()
    }
}

/// A connected client and the running backend.
pub struct MemoryBridge {
    pub client: BridgeClient,
    pub publisher: EventPublisher,
    pub server_task: JoinHandle<Result<(), BridgeError>>,
}

/// Start the demo backend on an in-memory link and connect a client to it.
pub async fn start_memory_bridge() -> MemoryBridge {
    let schema = demo_schema();
    let server = demo_server(Arc::clone(&schema));
    let publisher = server.publisher().clone();

    let (ui, backend) = memory::pair();
    let server_task = tokio::spawn(async move { server.serve(backend).await });
    let client = BridgeClient::connect(ui, schema, test_config())
        .await
        .expect("Failed to connect client");

    MemoryBridge {
        client,
        publisher,
        server_task,
    }
}

/// Backend end driven by the test itself.
pub struct ScriptedBackend {
    pub to_ui: mpsc::UnboundedSender<Envelope>,
    pub from_ui: mpsc::UnboundedReceiver<Envelope>,
}

impl ScriptedBackend {
    /// Next envelope from the client, failing the test after one second.
    pub async fn next(&mut self) -> Envelope {
        tokio::time::timeout(Duration::from_secs(1), self.from_ui.recv())
            .await
            .expect("Timed out waiting for an envelope")
            .expect("Client link closed")
    }

    /// Next Call envelope, returning its correlation id.
    pub async fn next_call(&mut self) -> (u64, Envelope) {
        let envelope = self.next().await;
        assert_eq!(envelope.validate().unwrap(), EnvelopeKind::Call);
        (envelope.correlation_id.unwrap(), envelope)
    }
}

/// Connect a client to a backend whose envelopes the test writes by hand.
pub async fn start_scripted_bridge(config: ClientConfig) -> (BridgeClient, ScriptedBackend) {
    let schema = demo_schema();
    let (ui, backend) = memory::pair();
    let (to_ui, mut from_ui) = backend.into_parts();

    let local = schema.token();
    let ack_sender = to_ui.clone();
    let answer = tokio::spawn(async move {
        let hello = Hello::from_envelope(&from_ui.recv().await.unwrap()).unwrap();
        let (ack, _) = handshake::evaluate(&hello, &local, None);
        ack_sender.send(ack.to_envelope()).unwrap();
        from_ui
    });

    let client = BridgeClient::connect(ui, schema, config)
        .await
        .expect("Failed to connect client");
    let from_ui = answer.await.unwrap();

    (client, ScriptedBackend { to_ui, from_ui })
}

/// Poll `condition` until it holds, failing the test after one second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Condition not reached in time");
}

