use redial_core::BoxError;
use std::io;
use thiserror::Error;

/// Errors produced by a stream session.
#[derive(Debug, Error)]
pub enum StreamError {
    /// `spawn` was called without a transport.
    #[error("stream session has no transport")]
    MissingTransport,

    /// `spawn` was called without an unmarshal function.
    #[error("stream session has no unmarshal function")]
    MissingUnmarshal,

    /// `spawn` was called without `marshal` or `marshal_into`.
    #[error("stream session has no marshal function")]
    MissingMarshal,

    /// The session was closed; no more messages can be sent.
    #[error("stream session is closed")]
    Closed,

    /// Reading, writing or framing failed.
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    /// An outgoing message could not be marshalled.
    #[error("failed to marshal message: {0}")]
    Marshal(#[source] BoxError),

    /// An incoming frame could not be unmarshalled.
    #[error("failed to unmarshal frame: {0}")]
    Unmarshal(#[source] BoxError),
}

impl StreamError {
    /// Returns `true` for the configuration errors reported by `spawn`.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            StreamError::MissingTransport | StreamError::MissingUnmarshal | StreamError::MissingMarshal
        )
    }
}

/// Result type for stream session operations.
pub type Result<T> = std::result::Result<T, StreamError>;
