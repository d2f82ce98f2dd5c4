use bridge_host::error::HostError;
use bridge_host::handlers::build_registry;
use bridge_host::logger::{ENV_LOG_LEVEL, initialize as LoggerInitialize, resolve_level};

use bridge_core::config::{BridgeConfig, try_load_dotenv};
use bridge_core::server::{BridgeServer, EventPublisher};
use bridge_core::transport::websocket::start_ipc_server;

use common::ErrorLocation;

use std::env;
use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info, warn};

const APP_DIR_NAME: &str = "bridge-host";

/// Overrides the directory `bridge.toml` is read from.
const ENV_CONFIG_DIR: &str = "BRIDGE_CONFIG_DIR";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), HostError> {
    let dotenv = try_load_dotenv();

    let log_dir = dirs::data_local_dir().map(|dir| dir.join(APP_DIR_NAME).join("logs"));
    if let Some(log_dir) = &log_dir {
        create_dir_all(log_dir).map_err(|e| HostError::Host {
            message: format!("Failed to create log directory: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
    }
    let level = resolve_level(env::var(ENV_LOG_LEVEL).ok().as_deref())?;
    LoggerInitialize(log_dir.as_deref(), level)?;

    info!("Bridge host starting");
    match &log_dir {
        Some(log_dir) => info!("Log directory: {}", log_dir.display()),
        None => warn!("No local data directory, logging to stdout only"),
    }
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config_dir = config_dir()?;
    let config = BridgeConfig::load(&config_dir)?;
    info!("Configuration loaded from {}", config_dir.display());

    let schema = contract::schema()?;
    let publisher = EventPublisher::new(schema.clone());
    let registry = build_registry(schema.clone(), &publisher)?;

    let mut server =
        BridgeServer::new(registry, publisher)?.with_handshake_timeout(config.handshake_timeout());
    match config.auth_token.clone() {
        Some(token) => {
            info!("IPC auth token configured ({} chars)", token.len());
            server = server.with_auth_token(token);
        }
        None => warn!("No IPC auth token configured; any local process may connect"),
    }

    let handle = start_ipc_server(config.ipc.port, server).await?;
    info!("Serving schema {} at {}", schema.token(), handle.url());

    tokio::signal::ctrl_c().await.map_err(|e| HostError::Host {
        message: format!("Failed to listen for shutdown signal: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    info!("Shutdown requested, stopping IPC server");
    drop(handle);
    Ok(())
}

fn config_dir() -> Result<PathBuf, HostError> {
    if let Ok(dir) = env::var(ENV_CONFIG_DIR) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| HostError::Host {
            message: format!("No config directory; set {ENV_CONFIG_DIR}"),
            location: ErrorLocation::from(Location::caller()),
        })
}
