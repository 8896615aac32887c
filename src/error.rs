//! Error types for gridwire-client.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for all gridwire operations.
#[derive(Debug, Error)]
pub enum GridwireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed byte stream (bad frame length, oversized frame, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A builtin codec could not decode the frames it was given.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A socket write failed. Every write pending at that moment receives
    /// a clone of the same cause.
    #[error("Write failed: {0}")]
    WriteFailed(Arc<std::io::Error>),

    /// The connection (or its writer) is closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
}

impl GridwireError {
    /// Whether this error means the connection is no longer usable.
    ///
    /// The invocation layer uses this to tell transport failures apart from
    /// errors in a single message.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            GridwireError::Io(_)
                | GridwireError::Protocol(_)
                | GridwireError::WriteFailed(_)
                | GridwireError::ConnectionClosed(_)
        )
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        GridwireError::Codec(message.into())
    }
}

/// Result type alias using GridwireError.
pub type Result<T> = std::result::Result<T, GridwireError>;
