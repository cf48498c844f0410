//! CLI command implementations
//!
//! Each command loads the configuration first; a bad config fails before
//! any runtime is started.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::cache::{spawn_purge, AdmissionControl, LocalCacheStorage, ResponseCache};
use crate::engine::{QueryEngine, QueryRequest, QueryResponse};
use crate::http_server::HttpServer;
use crate::observability::{Event, Logger, MetricsRegistry, ObservationScope};
use crate::pipeline::{DefaultSourceFactory, DefinitionStore};

use super::args::{Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(cli.log_level);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Query { config, path, args } => query(&config, &path, &args),
        Command::Check { config } => check(&config),
    }
}

/// Start the HTTP server and serve until interrupted
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(run_server(config))
}

async fn run_server(config: Config) -> CliResult<()> {
    let engine = Arc::new(build_engine(&config)?);
    let sweeper = engine
        .cache()
        .map(|cache| spawn_purge(Arc::clone(cache), config.purge_period()));

    let result = HttpServer::new(config.server.clone(), engine)
        .start()
        .await
        .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)));

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result
}

/// Run one pipeline and copy its output to stdout
pub fn query(config_path: &Path, path: &str, args: &[String]) -> CliResult<()> {
    let config = load_config(config_path)?;
    let mut request = QueryRequest::new(path);
    for arg in args {
        let (name, value) = parse_argument(arg)?;
        request = request.argument(name, value);
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    let scope = ObservationScope::with_fields("QUERY", vec![("path", path.to_string())]);
    let result = rt.block_on(stream_to_stdout(&config, request));

    match result {
        Ok(bytes) => {
            scope.complete(&[("bytes", &bytes.to_string())]);
            Ok(())
        }
        Err(err) => {
            scope.fail(&err.to_string());
            Err(err)
        }
    }
}

async fn stream_to_stdout(config: &Config, request: QueryRequest) -> CliResult<u64> {
    let engine = build_engine(config)?;
    let mut body = match engine.execute(request).await? {
        QueryResponse::NotModified { .. } => return Ok(0),
        QueryResponse::Stream { body, .. } => body,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| CliError::io_error(e.to_string()))?;
        out.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    out.flush()?;
    Ok(written)
}

/// Validate the configuration and load every pipeline definition
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = DefinitionStore::new(&config.definitions_dir);

    let paths = store.paths()?;
    for path in &paths {
        store.load(path)?;
    }

    let summary = serde_json::json!({
        "definitions": paths,
        "status": "ok",
    });
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", summary)?;
    Ok(())
}

fn load_config(path: &Path) -> CliResult<Config> {
    let config = Config::load(path)?;
    Logger::info(
        Event::ConfigLoaded,
        &[
            ("definitions_dir", &config.definitions_dir.display().to_string()),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(config)
}

/// Wire the engine from configuration; recovers cached entries when caching is on
pub fn build_engine(config: &Config) -> CliResult<QueryEngine> {
    let metrics = Arc::new(MetricsRegistry::new());
    let admission =
        AdmissionControl::new(config.admission.max_concurrent).with_metrics(Arc::clone(&metrics));

    let mut engine = QueryEngine::new(
        DefinitionStore::new(&config.definitions_dir),
        Arc::new(DefaultSourceFactory),
        admission,
        Arc::clone(&metrics),
        config.engine_config(),
    );

    if config.cache.enabled {
        let storage = LocalCacheStorage::new(&config.cache.dir)?;
        let cache = ResponseCache::new(Arc::new(storage), config.cache_max_age())
            .with_metrics(Arc::clone(&metrics));
        cache.recover()?;
        engine = engine.with_cache(Arc::new(cache));
    }

    Ok(engine)
}

/// Split `name=value`; the value may itself contain `=`
fn parse_argument(arg: &str) -> CliResult<(&str, &str)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(CliError::invalid_argument(format!(
            "Expected NAME=VALUE, got '{}'",
            arg
        ))),
    }
}
