//! CLI argument definitions using clap
//!
//! Commands:
//! - pipequery serve --config <path> [--port N]
//! - pipequery query --config <path> <pipeline-path> [--arg k=v]...
//! - pipequery check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Severity;

/// pipequery - a streaming query-pipeline server
#[derive(Parser, Debug)]
#[command(name = "pipequery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Lowest severity written to the log
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Severity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./pipequery.json")]
        config: PathBuf,

        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one pipeline and write the result to stdout
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./pipequery.json")]
        config: PathBuf,

        /// Pipeline path, optionally with a format extension
        path: String,

        /// Query argument as name=value; repeatable
        #[arg(long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,
    },

    /// Validate the configuration and every pipeline definition
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./pipequery.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
