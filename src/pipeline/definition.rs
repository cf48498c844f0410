//! Pipeline definitions
//!
//! A definition is a JSON document stored at `<definitions_dir>/<path>.json`:
//!
//! ```json
//! {
//!   "source": {"type": "test", "row_count": 21},
//!   "stages": [{"type": "filter", "expression": "value=lt=100"}],
//!   "formats": ["tsv", "json"],
//!   "max_concurrent": 2,
//!   "cache_max_age_secs": 300
//! }
//! ```
//!
//! The first format is used when the request names none.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;

use super::errors::{PipelineError, PipelineResult};
use super::source::SourceSpec;
use super::spec::StageSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub source: SourceSpec,

    #[serde(default)]
    pub stages: Vec<StageSpec>,

    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,

    /// Overrides the server-wide admission limit
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Overrides the server-wide cache age; `0` disables caching
    #[serde(default)]
    pub cache_max_age_secs: Option<u64>,
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Tsv]
}

impl PipelineDefinition {
    /// Pick the output format for a request extension
    pub fn select_format(&self, extension: Option<&str>) -> Option<OutputFormat> {
        match extension {
            None => self.formats.first().copied(),
            Some(ext) => OutputFormat::from_extension(ext).filter(|f| self.formats.contains(f)),
        }
    }

    fn validate(&self, path: &str) -> PipelineResult<()> {
        let invalid = |reason: &str| PipelineError::InvalidDefinition {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if self.formats.is_empty() {
            return Err(invalid("at least one format is required"));
        }
        if self.max_concurrent == Some(0) {
            return Err(invalid("max_concurrent must be at least 1"));
        }
        Ok(())
    }
}

/// Loads definitions from a directory tree
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    root: PathBuf,
}

impl DefinitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path such as `sales/daily` to its definition file
    pub fn file_for(&self, path: &str) -> PipelineResult<PathBuf> {
        let trimmed = path.trim_matches('/');
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if trimmed.is_empty() || !trimmed.split('/').all(valid_segment) {
            return Err(PipelineError::DefinitionNotFound(path.to_string()));
        }
        let mut file = self.root.clone();
        for segment in trimmed.split('/') {
            file.push(segment);
        }
        file.set_extension("json");
        Ok(file)
    }

    pub fn load(&self, path: &str) -> PipelineResult<PipelineDefinition> {
        let file = self.file_for(path)?;
        let text = fs::read_to_string(&file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::DefinitionNotFound(path.to_string()),
            _ => PipelineError::InvalidDefinition {
                path: path.to_string(),
                reason: e.to_string(),
            },
        })?;
        let definition: PipelineDefinition =
            serde_json::from_str(&text).map_err(|e| PipelineError::InvalidDefinition {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        definition.validate(path)?;
        Ok(definition)
    }

    /// Every definition path under the root, sorted
    pub fn paths(&self) -> PipelineResult<Vec<String>> {
        let mut paths = Vec::new();
        self.collect(&self.root, &mut paths)
            .map_err(|e| PipelineError::InvalidDefinition {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            })?;
        paths.sort();
        Ok(paths)
    }

    fn collect(&self, dir: &Path, paths: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, paths)?;
            } else if path.extension().map_or(false, |e| e == "json") {
                if let Ok(relative) = path.with_extension("").strip_prefix(&self.root) {
                    let segments: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    paths.push(segments.join("/"));
                }
            }
        }
        Ok(())
    }
}
