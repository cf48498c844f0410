//! # Sort Errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for sort operations
pub type SortResult<T> = Result<T, SortError>;

#[derive(Debug, Error)]
pub enum SortError {
    #[error("Sort field '{0}' does not exist")]
    UnknownField(String),

    #[error("Sort spill I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sort spill run {path} is corrupt: {reason}")]
    CorruptRun { path: PathBuf, reason: String },
}

impl SortError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SortError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, SortError::UnknownField(_))
    }
}
