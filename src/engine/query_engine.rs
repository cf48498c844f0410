//! Request orchestration
//!
//! ```text
//! resolve definition -> compile arguments -> fingerprint
//!     -> cache lookup --hit--> replay stored body
//!                     --wait-> look up again once the builder finishes
//!                     --miss-> admission -> produce (tee into cache)
//! ```
//!
//! The response is handed back once the producer has dispatched its first
//! chunk or finished. Anything that fails before then becomes a clean
//! error; later failures truncate the stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::bridge::{BridgeConfig, StreamBridge};
use crate::cache::{AdmissionControl, BuildHandle, FingerprintBuilder, Lookup, ResponseCache};
use crate::filters;
use crate::format::OutputFormat;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::pipeline::{
    Chain, DefinitionStore, PipelineDefinition, SourceFactory, StageContext, StageSpec,
};
use crate::sort::SortConfig;

use super::errors::{EngineError, EngineResult};
use super::producer::{self, Output, Production};
use super::request::{negotiate_format, split_extension, QueryRequest, QueryResponse};

/// Execution settings
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub sort: SortConfig,
    pub bridge: BridgeConfig,
    /// Wall-clock limit per execution
    pub timeout: Option<Duration>,
}

pub struct QueryEngine {
    definitions: DefinitionStore,
    sources: Arc<dyn SourceFactory>,
    cache: Option<Arc<ResponseCache>>,
    admission: AdmissionControl,
    metrics: Arc<MetricsRegistry>,
    config: EngineConfig,
}

/// A definition resolved for one request
struct Resolved {
    path: String,
    definition: PipelineDefinition,
    stages: Vec<StageSpec>,
    format: OutputFormat,
}

impl QueryEngine {
    pub fn new(
        definitions: DefinitionStore,
        sources: Arc<dyn SourceFactory>,
        admission: AdmissionControl,
        metrics: Arc<MetricsRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            definitions,
            sources,
            cache: None,
            admission,
            metrics,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Execute one request
    pub async fn execute(&self, request: QueryRequest) -> EngineResult<QueryResponse> {
        self.metrics.increment_requests();
        Logger::trace(Event::RequestReceived, &[("path", &request.path)]);

        let result = self.dispatch(&request).await;
        if let Err(err) = &result {
            if err.is_client_error() {
                self.metrics.increment_requests_rejected();
                Logger::warn(
                    Event::RequestRejected,
                    &[("path", &request.path), ("reason", &err.to_string())],
                );
            }
        }
        result
    }

    async fn dispatch(&self, request: &QueryRequest) -> EngineResult<QueryResponse> {
        let resolved = self.resolve(request)?;

        let max_age = match (&self.cache, resolved.definition.cache_max_age_secs) {
            (None, _) | (_, Some(0)) => None,
            (Some(cache), secs) => Some((
                cache,
                secs.map(Duration::from_secs)
                    .unwrap_or_else(|| cache.default_max_age()),
            )),
        };
        let Some((cache, max_age)) = max_age else {
            return self.build(resolved, None).await;
        };

        let fingerprint = FingerprintBuilder::new(resolved.path.as_str())
            .arguments(request.argument_pairs())
            .accept(request.accept.as_deref())
            .accept_encoding(request.accept_encoding.as_deref())
            .identity(&request.identity)
            .finish();

        loop {
            match cache.lookup(fingerprint.as_str(), Some(max_age))? {
                Lookup::Hit(entry) => {
                    if let Some(since) = request.if_modified_since {
                        if entry.not_modified_since(since) {
                            self.metrics.increment_cache_not_modified();
                            Logger::trace(
                                Event::CacheNotModified,
                                &[("key", fingerprint.as_str())],
                            );
                            return Ok(QueryResponse::NotModified {
                                last_modified: entry.last_modified_header(),
                            });
                        }
                    }
                    // Deleted between lookup and open: rebuild
                    let Some(body) = cache.open(&entry)? else {
                        continue;
                    };
                    let (bridge, stream) =
                        StreamBridge::new(&self.config.bridge, Some(Arc::clone(&self.metrics)));
                    let path = resolved.path.clone();
                    tokio::task::spawn_blocking(move || producer::replay(body, bridge, &path));
                    return Ok(QueryResponse::Stream {
                        content_type: resolved.format.content_type(),
                        last_modified: Some(entry.last_modified_header()),
                        body: stream,
                    });
                }
                Lookup::Wait(waiter) => {
                    waiter.wait().await;
                }
                Lookup::Build(handle) => return self.build(resolved, Some(handle)).await,
            }
        }
    }

    /// Load the definition, pick the format and compile the arguments
    fn resolve(&self, request: &QueryRequest) -> EngineResult<Resolved> {
        for (name, _) in &request.arguments {
            if name.starts_with('_') && !filters::is_recognised(name) {
                return Err(EngineError::UnrecognisedArgument(name.clone()));
            }
        }

        let (path, extension) = split_extension(&request.path);
        let definition = self.definitions.load(path)?;
        let format = negotiate_format(&definition, extension, request.accept.as_deref())
            .ok_or_else(|| EngineError::UnsupportedFormat {
                path: path.to_string(),
                format: extension.unwrap_or_default().to_string(),
            })?;

        // Request stages always run after the declared ones
        let mut stages = definition.stages.clone();
        stages.extend(filters::compile(request.argument_pairs())?);

        Ok(Resolved {
            path: path.to_string(),
            definition,
            stages,
            format,
        })
    }

    /// Run the pipeline for a confirmed miss
    async fn build(
        &self,
        resolved: Resolved,
        handle: Option<BuildHandle>,
    ) -> EngineResult<QueryResponse> {
        let permit = match self
            .admission
            .try_acquire(&resolved.path, resolved.definition.max_concurrent)
        {
            Ok(permit) => permit,
            Err(err) => {
                if let Some(handle) = handle {
                    handle.fail("admission rejected");
                }
                return Err(err.into());
            }
        };

        let source = self.sources.create(&resolved.definition.source)?;
        let context = StageContext {
            sort: self.config.sort.clone(),
            metrics: Some(Arc::clone(&self.metrics)),
        };
        let chain = Chain::from_specs(&resolved.stages, &context);

        let (bridge, body) = StreamBridge::new(&self.config.bridge, Some(Arc::clone(&self.metrics)));
        let (started_tx, started_rx) = oneshot::channel();
        let production = Production {
            path: resolved.path,
            source,
            chain,
            formatter: resolved.format.formatter(),
            output: Output::new(bridge, handle, started_tx),
            timeout: self.config.timeout,
            metrics: Arc::clone(&self.metrics),
            permit: Some(permit),
        };
        tokio::task::spawn_blocking(move || producer::produce(production));

        match started_rx.await {
            Ok(Ok(())) => Ok(QueryResponse::Stream {
                content_type: resolved.format.content_type(),
                last_modified: None,
                body,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EngineError::Internal(
                "producer exited without a result".to_string(),
            )),
        }
    }
}
