//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Coarse classification of a [`BgRemovalError`]
///
/// Callers that present errors (status line, exit code) match on this instead
/// of inspecting message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller mistake: unknown model id, unsupported extension, value out of range
    Configuration,
    /// File missing, unreadable or unwritable
    Io,
    /// The inference backend failed while loading a model or transforming an image
    Processing,
    /// Model weights could not be fetched
    Network,
    /// Unexpected internal state
    Internal,
}

/// Error types for background removal operations
///
/// No variant is ever retried automatically. Every failure is terminal for the
/// request that produced it.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failure during session creation or transform, message kept verbatim
    #[error("Processing error: {0}")]
    Processing(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error from a context message and its cause
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::Configuration(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Classify this error into the three-way taxonomy plus download/internal
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
            Self::Processing(_) => ErrorKind::Processing,
            Self::Network(_) => ErrorKind::Network,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
