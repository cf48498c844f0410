//! CLI-specific error types
//!
//! Every CLI error is fatal: `main` prints it and exits non-zero.

use std::fmt;
use std::io;

use crate::cache::CacheError;
use crate::engine::EngineError;
use crate::pipeline::PipelineError;

use super::config::ConfigError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, cache directory)
    IoError,
    /// Malformed command-line argument
    InvalidArgument,
    /// A pipeline definition failed to load
    DefinitionError,
    /// Query execution failed
    QueryFailed,
    /// Runtime or server start-up failed
    BootFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PIPEQUERY_CONFIG_ERROR",
            Self::IoError => "PIPEQUERY_IO_ERROR",
            Self::InvalidArgument => "PIPEQUERY_INVALID_ARGUMENT",
            Self::DefinitionError => "PIPEQUERY_DEFINITION_ERROR",
            Self::QueryFailed => "PIPEQUERY_QUERY_FAILED",
            Self::BootFailed => "PIPEQUERY_BOOT_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        Self::new(CliErrorCode::DefinitionError, e.to_string())
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        let code = if e.is_client_error() {
            CliErrorCode::InvalidArgument
        } else {
            CliErrorCode::QueryFailed
        };
        Self::new(code, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterError;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::invalid_argument("expected name=value");
        assert_eq!(
            err.to_string(),
            "PIPEQUERY_INVALID_ARGUMENT: expected name=value"
        );
    }

    #[test]
    fn test_engine_errors_split_by_class() {
        let client: CliError = EngineError::Filter(FilterError::InvalidInteger("limit")).into();
        assert_eq!(client.code(), CliErrorCode::InvalidArgument);

        let server: CliError = EngineError::Internal("boom".into()).into();
        assert_eq!(server.code(), CliErrorCode::QueryFailed);
    }
}
