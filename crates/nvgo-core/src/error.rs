//! Error types for the core crate.

use nvgo_editor::EditorError;
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No package or project root above the directory.
    #[error("no Go package found in {dir}")]
    NoPackage { dir: String },

    /// The tool binary is not installed.
    #[error("{tool}: executable not found in PATH")]
    ToolMissing { tool: String },

    /// The tool could not be started.
    #[error("{tool}: failed to start: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited with a failure status.
    #[error("{tool} exited with {}: {}", exit_label(.code), .stderr.trim())]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Tool output could not be parsed into diagnostics.
    #[error("malformed diagnostic {line:?}: {reason}")]
    MalformedDiagnostic { line: String, reason: String },

    /// The build tool is not one the parser understands.
    #[error("unknown build tool: {0}")]
    UnknownTool(String),

    /// The analyzer answered with a shape that does not fit the mode.
    #[error("{mode}: unexpected result: {detail}")]
    TypeAssertion { mode: String, detail: String },

    /// The task observed its cancellation.
    #[error("cancelled")]
    Cancelled,

    /// Editor RPC failure.
    #[error("editor: {0}")]
    Editor(#[from] EditorError),

    /// The debug session failed; only that session is affected.
    #[error("debugger: {0}")]
    Debugger(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Bad user input to a command.
    #[error("{0}")]
    InvalidArgument(String),

    /// Something the command looked for does not exist.
    #[error("{0}")]
    NotFound(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

impl CoreError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a malformed diagnostic error.
    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDiagnostic {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Create a type assertion error.
    pub fn type_assertion(mode: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TypeAssertion {
            mode: mode.into(),
            detail: detail.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
