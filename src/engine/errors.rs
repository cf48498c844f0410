//! # Engine Errors
//!
//! Every failure a request can meet, classified into an HTTP status.

use std::time::Duration;

use thiserror::Error;

use crate::cache::{AdmissionError, CacheError};
use crate::filters::FilterError;
use crate::pipeline::PipelineError;

/// Result type for request execution
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Unrecognised argument: {0}")]
    UnrecognisedArgument(String),

    #[error("Format '{format}' is not available for pipeline '{path}'")]
    UnsupportedFormat { path: String, format: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Output failed: {0}")]
    Output(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Filter(_) | EngineError::UnrecognisedArgument(_) => 400,
            EngineError::UnsupportedFormat { .. } => 404,
            EngineError::Pipeline(PipelineError::DefinitionNotFound(_)) => 404,
            EngineError::Pipeline(e) if e.is_client_error() => 400,
            EngineError::Admission(AdmissionError::TooManyRequests { .. }) => 429,
            _ => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(EngineError::Filter(FilterError::InvalidSort).status_code(), 400);
        assert_eq!(EngineError::UnrecognisedArgument("_x".into()).status_code(), 400);
        assert_eq!(
            EngineError::Pipeline(PipelineError::UnknownField("x".into())).status_code(),
            400
        );
        assert_eq!(
            EngineError::Pipeline(PipelineError::DefinitionNotFound("p".into())).status_code(),
            404
        );
        assert_eq!(
            EngineError::Admission(AdmissionError::TooManyRequests {
                resource: "p".into(),
                limit: 1
            })
            .status_code(),
            429
        );
        assert_eq!(EngineError::Admission(AdmissionError::Poisoned).status_code(), 500);
        assert_eq!(
            EngineError::Pipeline(PipelineError::source("db down")).status_code(),
            500
        );
        assert_eq!(EngineError::Timeout(Duration::from_secs(3)).status_code(), 500);
    }

    #[test]
    fn test_filter_message_is_verbatim() {
        let err = EngineError::from(FilterError::InvalidInteger("limit"));
        assert_eq!(
            err.to_string(),
            "Invalid argument to _limit filter, should be an integer"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            EngineError::Timeout(Duration::from_secs(30)).to_string(),
            "Execution timed out after 30s"
        );
    }
}
