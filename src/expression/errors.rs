//! # Expression Errors

use thiserror::Error;

/// Result type for expression parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// A malformed filter expression.
///
/// Always a client input error; never raised while evaluating rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at '{fragment}'")]
pub struct ParseError {
    message: String,
    fragment: String,
}

/// Longest fragment quoted back in an error.
const MAX_FRAGMENT_CHARS: usize = 32;

impl ParseError {
    pub fn new(message: impl Into<String>, fragment: &str) -> Self {
        let fragment = if fragment.is_empty() {
            "<end of input>".to_string()
        } else {
            fragment.chars().take(MAX_FRAGMENT_CHARS).collect()
        };
        Self {
            message: message.into(),
            fragment,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The unparsed text at the point of failure
    pub fn fragment(&self) -> &str {
        &self.fragment
    }
}
