//! Logging setup using tracing.
//!
//! stdout belongs to the RPC channel, so logs go to a file (or stderr when
//! explicitly requested) and never to stdout.

use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Where log records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to the given file.
    File(PathBuf),
    /// Write to stderr.
    Stderr,
}

impl LogTarget {
    /// Interpret a `--log-file` argument. `-` selects stderr.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("-") => LogTarget::Stderr,
            Some(path) => LogTarget::File(PathBuf::from(path)),
            None => LogTarget::File(default_log_path()),
        }
    }
}

/// Logging configuration.
pub struct LogConfig {
    /// Log level.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
    /// Destination.
    pub target: LogTarget,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_location: false,
            target: LogTarget::Stderr,
        }
    }
}

impl LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn directive(&self) -> String {
        let level = self.level.as_str();
        format!("nvgo={level},nvgo_core={level},nvgo_commands={level},nvgo_editor={level},nvgo_rpc={level},nvgo_delve={level}")
    }
}

/// Initialize logging with the given configuration.
///
/// Must be called once at startup. Returns the log file path when logging
/// to a file.
pub fn init(config: LogConfig) -> Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    match &config.target {
        LogTarget::Stderr => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| Error::AlreadyInitialized(e.to_string()))?;
            Ok(None)
        }
        LogTarget::File(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|source| Error::LogDirectory {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| Error::LogFile {
                    path: path.clone(),
                    source,
                })?;
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| Error::AlreadyInitialized(e.to_string()))?;
            Ok(Some(path.clone()))
        }
    }
}

/// Get the default log file path.
pub fn default_log_path() -> PathBuf {
    log_dir().join("nvgo.log")
}

/// Get the log directory path.
pub fn log_dir() -> PathBuf {
    // macOS: ~/Library/Logs/nvgo
    // Linux: ~/.local/state/nvgo/logs
    // Windows: %LOCALAPPDATA%/nvgo/logs

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library/Logs/nvgo");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return state_dir.join("nvgo/logs");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".local/state/nvgo/logs");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app) = dirs::data_local_dir() {
            return local_app.join("nvgo/logs");
        }
    }

    std::env::temp_dir().join("nvgo")
}
