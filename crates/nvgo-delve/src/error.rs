//! Debug session error types.

use nvgo_core::CoreError;
use nvgo_editor::EditorError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Result type for debug session operations.
pub type DelveResult<T> = Result<T, DelveError>;

/// Errors raised by the debug session. Any of them ends only the session
/// that produced it.
#[derive(Debug, Error)]
pub enum DelveError {
    /// The debugger binary is not installed.
    #[error("{0}: executable not found in PATH")]
    ToolMissing(String),

    /// The debugger server could not be started.
    #[error("failed to start debugger: {0}")]
    Spawn(#[source] std::io::Error),

    /// The server never accepted a connection.
    #[error("debugger did not listen on {address}: {detail}")]
    Connect { address: String, detail: String },

    /// The server exited before or while serving.
    #[error("debugger exited: {0}")]
    ServerExited(String),

    /// The server answered a request with an error.
    #[error("{method}: {message}")]
    Remote { method: String, message: String },

    /// Malformed traffic on the debugger connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("debugger connection closed")]
    ConnectionClosed,

    #[error("no debug session is running")]
    NotRunning,

    #[error("a debug session is already running")]
    AlreadyRunning,

    /// Bad user input.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("cancelled")]
    Cancelled,

    #[error("editor: {0}")]
    Editor(#[from] EditorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DelveError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<LinesCodecError> for DelveError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::Io(e) => Self::Io(e),
            LinesCodecError::MaxLineLengthExceeded => Self::protocol("line too long"),
        }
    }
}

impl From<DelveError> for CoreError {
    fn from(err: DelveError) -> Self {
        match err {
            DelveError::Cancelled => CoreError::Cancelled,
            DelveError::InvalidArgument(message) => CoreError::InvalidArgument(message),
            DelveError::Editor(e) => CoreError::Editor(e),
            DelveError::ToolMissing(tool) => CoreError::ToolMissing { tool },
            other => CoreError::Debugger(other.to_string()),
        }
    }
}
