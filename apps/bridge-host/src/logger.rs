//! Logging for the bridge host: colored stdout plus an optional plain log file.
//!
//! The level comes from `BRIDGE_LOG` when set, otherwise from the build
//! profile. Initialization runs once per process.

use crate::error::HostError;

use common::ErrorLocation;

use std::fmt::{Arguments, Display};
use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

pub const LOG_FILE_NAME: &str = "bridge-host.log";

/// Environment variable overriding the log level (`error` .. `trace`, `off`).
pub const ENV_LOG_LEVEL: &str = "BRIDGE_LOG";

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Frame-level chatter from the WebSocket stack.
const NOISY_MODULES: [&str; 2] = ["tungstenite", "tokio_tungstenite"];

/// Resolve the level from an optional `BRIDGE_LOG` value.
///
/// # Errors
///
/// Returns [`HostError::Host`] for a value that is not a level name.
#[track_caller]
pub fn resolve_level(raw: Option<&str>) -> Result<LevelFilter, HostError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(DEFAULT_LOG_LEVEL),
        Some(raw) => LevelFilter::from_str(raw).map_err(|_| HostError::Host {
            message: format!("Invalid {ENV_LOG_LEVEL} value '{raw}'"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

/// Initialize logging to stdout and, when `log_dir` is given, to
/// `<log_dir>/bridge-host.log`.
///
/// Later calls log a warning and return Ok.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or another logger is
/// already installed.
pub fn initialize(log_dir: Option<&Path>, level: LevelFilter) -> Result<(), HostError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_dir, level);
        if result.is_ok() {
            info!("Logger initialized with level: {level:?}");
        }
    });

    result
}

#[track_caller]
fn initialize_internal(log_dir: Option<&Path>, level: LevelFilter) -> Result<(), HostError> {
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let mut base_dispatch = Dispatch::new().level(level);
    for module in NOISY_MODULES {
        base_dispatch = base_dispatch.level_for(module, level.min(LevelFilter::Info));
    }

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}",
                line(record, colors.color(record.level()), message)
            ))
        })
        .chain(stdout());
    base_dispatch = base_dispatch.chain(stdout_dispatch);

    if let Some(log_dir) = log_dir {
        let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME)).map_err(|e| HostError::Host {
            message: format!("Failed to create log file in {}: {e}", log_dir.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;
        let file_dispatch = Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!("{}", line(record, record.level(), message)))
            })
            .chain(log_file);
        base_dispatch = base_dispatch.chain(file_dispatch);
    }

    base_dispatch.apply().map_err(|e| HostError::Host {
        message: format!("Failed to initialize logger: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

fn line(record: &Record<'_>, level: impl Display, message: &Arguments<'_>) -> String {
    format!(
        "[{date} - {level}] {message} [{file}:{line}]",
        date = format_rfc3339(SystemTime::now()),
        file = record.file().unwrap_or("unknown"),
        line = record.line().unwrap_or(0),
    )
}
