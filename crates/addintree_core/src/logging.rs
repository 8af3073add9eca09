//! Logging bootstrap for hosts embedding the extension tree.
//!
//! # Responsibility
//! - Start rolling file logs once per process.
//! - Capture panics from host doozers/evaluators into the log.
//!
//! # Invariants
//! - Re-initializing with the same settings is a no-op.
//! - Re-initializing with different settings is rejected, never applied.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "addintree";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 8 * 1024 * 1024;
const MAX_LOG_FILES: usize = 4;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Validated logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    level: &'static str,
    log_dir: PathBuf,
}

impl LogSettings {
    /// Validates a level name (`trace|debug|info|warn|error`) and an absolute directory.
    pub fn new(level: &str, log_dir: impl AsRef<Path>) -> Result<Self, LoggingError> {
        let level = match level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            other => return Err(LoggingError::UnsupportedLevel(other.to_string())),
        };

        let log_dir = log_dir.as_ref();
        if log_dir.as_os_str().is_empty() {
            return Err(LoggingError::EmptyDirectory);
        }
        if !log_dir.is_absolute() {
            return Err(LoggingError::RelativeDirectory(log_dir.to_path_buf()));
        }
        Ok(Self {
            level,
            log_dir: log_dir.to_path_buf(),
        })
    }

    pub fn level(&self) -> &'static str {
        self.level
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Logging setup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    EmptyDirectory,
    RelativeDirectory(PathBuf),
    CreateDirectory { path: PathBuf, message: String },
    Backend(String),
    AlreadyInitialized { active: LogSettings },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::EmptyDirectory => write!(f, "log directory must not be empty"),
            Self::RelativeDirectory(path) => {
                write!(f, "log directory must be absolute, got `{}`", path.display())
            }
            Self::CreateDirectory { path, message } => write!(
                f,
                "failed to create log directory `{}`: {message}",
                path.display()
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
            Self::AlreadyInitialized { active } => write!(
                f,
                "logging already initialized with level `{}` at `{}`; refusing to switch",
                active.level,
                active.log_dir.display()
            ),
        }
    }
}

impl Error for LoggingError {}

/// Starts file logging with `settings`.
///
/// # Errors
/// - `AlreadyInitialized` when a different configuration is already active.
/// - `CreateDirectory` / `Backend` when the log backend cannot start.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let active = ACTIVE.get_or_try_init(|| start_logger(settings.clone()))?;
    if &active.settings != settings {
        return Err(LoggingError::AlreadyInitialized {
            active: active.settings.clone(),
        });
    }
    Ok(())
}

/// Active settings, `None` before `init_logging` succeeds.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE.get().map(|active| active.settings.clone())
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| LoggingError::CreateDirectory {
        path: settings.log_dir.clone(),
        message: err.to_string(),
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} version={}",
        settings.level,
        settings.log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".to_string());
            let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = info.payload().downcast_ref::<String>() {
                message.clone()
            } else {
                "non-string panic payload".to_string()
            };
            error!(
                "event=panic_captured module=logging status=error location={} payload={}",
                location,
                single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
            );
            previous(info);
        }));
    });
}

fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut truncated: String = flattened.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
