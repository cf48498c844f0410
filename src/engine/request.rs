//! Request and response types independent of the transport

use chrono::{DateTime, Utc};

use crate::bridge::BridgeBody;
use crate::cache::Identity;
use crate::format::OutputFormat;
use crate::pipeline::PipelineDefinition;

/// One query against a pipeline definition
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Definition path, optionally ending in a format extension
    pub path: String,
    /// Query arguments in request order
    pub arguments: Vec<(String, String)>,
    pub accept: Option<String>,
    pub accept_encoding: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub identity: Identity,
}

impl QueryRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    pub(crate) fn argument_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.arguments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub enum QueryResponse {
    /// The client's copy is current
    NotModified { last_modified: String },
    /// Response body follows
    Stream {
        content_type: &'static str,
        /// Set when the body comes from the cache
        last_modified: Option<String>,
        body: BridgeBody,
    },
}

/// Split `demo/data.csv` into `demo/data` and a known format extension
pub(crate) fn split_extension(path: &str) -> (&str, Option<&str>) {
    let trimmed = path.trim_matches('/');
    let last_segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && OutputFormat::from_extension(ext).is_some() => {
            (&trimmed[..trimmed.len() - ext.len() - 1], Some(ext))
        }
        _ => (trimmed, None),
    }
}

/// Output format for a request.
///
/// An explicit extension must be one the definition offers. Otherwise the
/// first offered format named in `Accept` wins, then the first offered.
pub(crate) fn negotiate_format(
    definition: &PipelineDefinition,
    extension: Option<&str>,
    accept: Option<&str>,
) -> Option<OutputFormat> {
    if extension.is_some() {
        return definition.select_format(extension);
    }
    let accepted = accept.and_then(|accept| {
        definition.formats.iter().copied().find(|format| {
            let mime = format.content_type().split(';').next().unwrap_or_default();
            accept.contains(mime)
        })
    });
    accepted.or_else(|| definition.select_format(None))
}
