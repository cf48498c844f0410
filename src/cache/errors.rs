//! # Cache and Admission Errors

use std::io;

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for admission control
pub type AdmissionResult<T> = Result<T, AdmissionError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Cache state lock poisoned")]
    Poisoned,
}

impl CacheError {
    pub fn io(key: impl Into<String>, source: io::Error) -> Self {
        CacheError::Io {
            key: key.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Too many concurrent requests")]
    TooManyRequests { resource: String, limit: usize },

    #[error("Admission state lock poisoned")]
    Poisoned,
}
