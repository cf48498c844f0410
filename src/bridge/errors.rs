//! # Bridge Errors

use std::io;

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The consumer went away, usually a client disconnect
    #[error("Stream consumer closed")]
    Closed,

    /// The producer gave up part way through the response
    #[error("Response aborted: {0}")]
    Aborted(String),

    /// The producer stayed parked past its execution deadline
    #[error("Stream deadline exceeded")]
    DeadlineExceeded,
}

impl From<BridgeError> for io::Error {
    fn from(err: BridgeError) -> Self {
        let kind = match err {
            BridgeError::Closed => io::ErrorKind::BrokenPipe,
            BridgeError::Aborted(_) => io::ErrorKind::Other,
            BridgeError::DeadlineExceeded => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, err)
    }
}
