pub mod bridge;
pub mod config;
pub mod ipc;
pub mod schema;

pub use bridge::BridgeError;
pub use config::ConfigError;
pub use ipc::IpcError;
pub use schema::SchemaError;
