//! Editor surface error types.

use nvgo_rpc::TransportError;
use thiserror::Error;

/// Result type for editor operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Errors that can occur while talking to the editor.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The editor rejected the request.
    #[error("{method}: {message}")]
    Remote { method: String, message: String },

    /// The editor did not answer in time.
    #[error("Editor request timed out: {0}")]
    Timeout(String),

    /// The channel to the editor is gone.
    #[error("Editor channel closed")]
    Closed,

    /// The editor answered with a value of an unexpected shape.
    #[error("Unexpected response to {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    /// One call of an atomic batch failed.
    #[error("Batch call {index} failed: {message}")]
    Batch { index: usize, message: String },

    /// Transport-level failure.
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl EditorError {
    /// Create an unexpected response error.
    pub fn unexpected(method: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            detail: detail.to_string(),
        }
    }

    /// Map a transport failure of `method` into an editor error.
    pub fn from_transport(method: &str, err: TransportError) -> Self {
        match err {
            TransportError::Remote(e) => Self::Remote {
                method: method.to_string(),
                message: e.message,
            },
            TransportError::Timeout(m) => Self::Timeout(m),
            TransportError::ChannelClosed => Self::Closed,
            other => Self::Rpc(other.to_string()),
        }
    }
}
