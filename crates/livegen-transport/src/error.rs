//! Transport errors

/// Fatal error for one job
///
/// Settles the job's pending result exactly once. Render sessions bound to
/// the job keep their last good state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(String),

    /// Malformed or unexpected frame
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge { len: usize, limit: usize },

    /// The server refused the credential
    #[error("handshake rejected: {reason}")]
    Rejected { reason: String },

    #[error("handshake timed out after {millis}ms")]
    HandshakeTimeout { millis: u64 },

    /// Connection ended before a terminal event
    #[error("connection closed before the job finished")]
    Closed,

    /// The job ended with an `error` event
    #[error("job failed: {reason}")]
    Server { reason: String },

    /// The client closed the session
    #[error("job cancelled")]
    Cancelled,

    #[error("a job request was already sent on this session")]
    AlreadySubmitted,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl TransportError {
    /// Whether a fresh connection might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Closed | Self::HandshakeTimeout { .. }
        )
    }
}
