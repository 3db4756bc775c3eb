//! Error types for livegen core

use livegen_runtime::{ExecutionFault, SynthesisError};
use livegen_source::SanitizeError;
use livegen_transport::TransportError;

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },

    #[error("malformed configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main livegen error type
#[derive(Debug, thiserror::Error)]
pub enum LivegenError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sanitization failed: {0}")]
    Sanitize(#[from] SanitizeError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("execution fault: {0}")]
    Execution(#[from] ExecutionFault),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LivegenError {
    /// Check if a new attempt might succeed
    ///
    /// Nothing is retried automatically; this informs the caller.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// The job was closed by the caller
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }
}
