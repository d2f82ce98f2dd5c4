//! Bridge configuration loaded from `{config_dir}/bridge.toml`.
//!
//! A missing file yields defaults. A file that exists but cannot be read,
//! parsed or validated is an error. Environment variables (optionally from a
//! `.env` file) override individual values after the file is read:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `BRIDGE_IPC_PORT` | `ipc.port` |
//! | `BRIDGE_CALL_TIMEOUT_MS` | `calls.timeout_ms` |
//! | `BRIDGE_AUTH_TOKEN` | handshake auth token (never read from the file) |

use crate::client::ClientConfig;
use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "bridge.toml";
const CONFIG_VERSION: u32 = 1;

pub const ENV_IPC_PORT: &str = "BRIDGE_IPC_PORT";
pub const ENV_CALL_TIMEOUT_MS: &str = "BRIDGE_CALL_TIMEOUT_MS";
pub const ENV_AUTH_TOKEN: &str = "BRIDGE_AUTH_TOKEN";

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpcConfig {
    /// Port on 127.0.0.1. Zero binds an ephemeral port.
    #[serde(default = "default_ipc_port")]
    pub port: u16,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            port: default_ipc_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallsConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Upper bound on the UI's connect retries while the backend starts.
    #[serde(default = "default_connect_max_elapsed_ms")]
    pub connect_max_elapsed_ms: u64,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            connect_max_elapsed_ms: default_connect_max_elapsed_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub ipc: IpcConfig,

    #[serde(default)]
    pub calls: CallsConfig,

    #[serde(skip)]
    pub auth_token: Option<RedactedToken>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            ipc: IpcConfig::default(),
            calls: CallsConfig::default(),
            auth_token: None,
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_ipc_port() -> u16 {
    19876
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_connect_max_elapsed_ms() -> u64 {
    5_000
}

// ============================================
// IMPLEMENTATION
// ============================================

impl BridgeConfig {
    /// Load config from {config_dir}/bridge.toml, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed,
    /// an override variable holds an invalid value, or validation fails.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|e| {
                ConfigError::ReadError {
                    location: ErrorLocation::from(Location::caller()),
                    path: config_path.clone(),
                    source: e,
                }
            })?;
            let config = Self::parse(&contents, &config_path)?;
            info!("Config loaded from {}", config_path.display());
            config
        } else {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    #[track_caller]
    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: PathBuf::from(path),
            reason: e.to_string(),
        })
    }

    /// Apply overrides looked up by variable name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OverrideError`] for a value that does not parse.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup(ENV_IPC_PORT) {
            self.ipc.port = parse_override(ENV_IPC_PORT, &port)?;
            info!("{ENV_IPC_PORT} overrides ipc.port: {}", self.ipc.port);
        }
        if let Some(timeout) = lookup(ENV_CALL_TIMEOUT_MS) {
            self.calls.timeout_ms = parse_override(ENV_CALL_TIMEOUT_MS, &timeout)?;
            info!(
                "{ENV_CALL_TIMEOUT_MS} overrides calls.timeout_ms: {}",
                self.calls.timeout_ms
            );
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            let token = RedactedToken::new(token);
            if token.is_empty() {
                warn!("{ENV_AUTH_TOKEN} is set but empty, ignoring");
            } else {
                info!("Handshake auth token loaded ({} chars)", token.len());
                self.auth_token = Some(token);
            }
        }
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        for (name, value) in [
            ("calls.timeout_ms", self.calls.timeout_ms),
            ("calls.handshake_timeout_ms", self.calls.handshake_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.calls.timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.calls.handshake_timeout_ms)
    }

    pub fn connect_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.calls.connect_max_elapsed_ms)
    }

    /// Settings for a UI-side [`BridgeClient`](crate::client::BridgeClient).
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            call_timeout: self.call_timeout(),
            handshake_timeout: self.handshake_timeout(),
            auth_token: self.auth_token.clone(),
        }
    }
}

#[track_caller]
fn parse_override<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::OverrideError {
        location: ErrorLocation::from(Location::caller()),
        variable,
        reason: format!("'{raw}': {e}"),
    })
}

/// Load `.env` from the working directory, then from the executable's
/// directory. Returns the file that was loaded.
pub fn try_load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded .env from: {:?}", path);
        return Some(path);
    }

    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let env_path = exe_dir.join(".env");
    if !env_path.exists() {
        return None;
    }
    match dotenvy::from_path(&env_path) {
        Ok(()) => {
            info!("Loaded .env from: {:?}", env_path);
            Some(env_path)
        }
        Err(e) => {
            warn!("Failed to parse .env at {:?}: {}", env_path, e);
            None
        }
    }
}
