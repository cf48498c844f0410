//! # Pipeline Errors

use thiserror::Error;

use crate::expression::ParseError;
use crate::sort::SortError;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Field '{0}' does not exist")]
    UnknownField(String),

    #[error("Invalid filter expression: {0}")]
    Expression(#[from] ParseError),

    #[error(transparent)]
    Sort(#[from] SortError),

    #[error("Source failed: {0}")]
    Source(String),

    #[error("Output failed: {0}")]
    Output(String),

    /// The sink asked for an early stop; the caller knows whether that was
    /// a disconnect or a timeout
    #[error("Execution cancelled")]
    Cancelled,

    #[error("Pipeline '{0}' not found")]
    DefinitionNotFound(String),

    #[error("Invalid pipeline definition '{path}': {reason}")]
    InvalidDefinition { path: String, reason: String },
}

impl PipelineError {
    pub fn source(message: impl Into<String>) -> Self {
        PipelineError::Source(message.into())
    }

    /// Whether the request, not the server, caused the failure
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::UnknownField(_) => true,
            PipelineError::Sort(e) => e.is_client_error(),
            _ => false,
        }
    }
}
