//! CLI module for pipequery
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP query server
//! - query: One-shot pipeline execution to stdout
//! - check: Validate configuration and pipeline definitions

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command};
pub use commands::{build_engine, check, query, run, run_command, serve};
pub use config::{AdmissionConfig, CacheConfig, Config, ConfigError, ConfigResult, ExecutionConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
