//! # Filter Errors
//!
//! Messages are returned verbatim to the client.

use thiserror::Error;

use crate::expression::ParseError;

/// Result type for filter compilation
pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid argument to _query filter, should be a valid RSQL expression")]
    InvalidQuery(#[source] ParseError),

    #[error("Invalid argument to _{0} filter, should be an integer")]
    InvalidInteger(&'static str),

    #[error("Invalid argument to _sort filter, should be a space delimited list of fields, each of which may be prefixed with '-' to sort descending")]
    InvalidSort,

    #[error("Invalid argument to _map filter, should be a space delimited list of relabels, each of which should be SourceLabel:NewLabel.  The new label cannot contain a colon or a space, if the new label is blank the field will be dropped - the source label may not be blank.")]
    InvalidMap,

    #[error("Invalid argument to _relabel filter, should be a space delimited list of relabels, each of which should be SourceLabel:NewLabel.  Neither label may be blank.")]
    InvalidRelabel,

    #[error("Invalid argument to _without filter, should be a space delimited list of fields")]
    InvalidWithout,
}

impl FilterError {
    /// The argument the error refers to
    pub fn argument(&self) -> &'static str {
        match self {
            FilterError::InvalidQuery(_) => "_query",
            FilterError::InvalidInteger("limit") => "_limit",
            FilterError::InvalidInteger(_) => "_offset",
            FilterError::InvalidSort => "_sort",
            FilterError::InvalidMap => "_map",
            FilterError::InvalidRelabel => "_relabel",
            FilterError::InvalidWithout => "_without",
        }
    }
}
