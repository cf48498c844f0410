//! Configuration file
//!
//! ```json
//! {
//!   "definitions_dir": "./pipelines",
//!   "server": {"host": "0.0.0.0", "port": 8080},
//!   "cache": {"enabled": true, "dir": "./cache", "max_age_secs": 300, "purge_period_secs": 60},
//!   "admission": {"max_concurrent": 4},
//!   "sort": {"memory_threshold_bytes": 67108864},
//!   "bridge": {"high_water_mark": 16, "flush_threshold_bytes": 65536},
//!   "execution": {"timeout_secs": 300}
//! }
//! ```
//!
//! Only `definitions_dir` is required.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::BridgeConfig;
use crate::engine::EngineConfig;
use crate::http_server::HttpServerConfig;
use crate::sort::SortConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `<path>.json` pipeline definitions
    pub definitions_dir: PathBuf,

    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub sort: SortConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Default entry lifetime; a pipeline definition may override it
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_purge_period_secs")]
    pub purge_period_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_max_age_secs() -> u64 {
    300
}

fn default_purge_period_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: default_cache_dir(),
            max_age_secs: default_max_age_secs(),
            purge_period_secs: default_purge_period_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Concurrent builds per pipeline unless its definition says otherwise
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// `0` disables the limit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));

        if self.admission.max_concurrent == 0 {
            return invalid("admission.max_concurrent must be at least 1");
        }
        if self.cache.enabled && self.cache.purge_period_secs == 0 {
            return invalid("cache.purge_period_secs must be > 0");
        }
        if self.sort.memory_threshold_bytes == 0 {
            return invalid("sort.memory_threshold_bytes must be > 0");
        }
        if self.bridge.high_water_mark == 0 {
            return invalid("bridge.high_water_mark must be > 0");
        }
        if self.bridge.flush_threshold_bytes == 0 {
            return invalid("bridge.flush_threshold_bytes must be > 0");
        }
        if self.bridge.consumer_queue_chunks == 0 {
            return invalid("bridge.consumer_queue_chunks must be > 0");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        let timeout = match self.execution.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        EngineConfig {
            sort: self.sort.clone(),
            bridge: self.bridge.clone(),
            timeout,
        }
    }

    pub fn purge_period(&self) -> Duration {
        Duration::from_secs(self.cache.purge_period_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache.max_age_secs)
    }
}
