//! # HTTP Server
//!
//! Combines the query and observability routers and serves them until
//! Ctrl-C.

use std::io;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::observability_routes::observability_routes;
use super::query_routes::query_routes;
use crate::engine::QueryEngine;
use crate::observability::{Event, Logger};

/// HTTP server for the query engine
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, engine: Arc<QueryEngine>) -> Self {
        let router = Self::build_router(&config, engine);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, engine: Arc<QueryEngine>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(observability_routes(Arc::clone(engine.metrics()), config.expose_metrics))
            .merge(query_routes(engine))
            .layer(cors)
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until Ctrl-C
    pub async fn start(self) -> io::Result<()> {
        let addr = self.config.bind_addr()?;

        let listener = TcpListener::bind(addr).await?;
        Logger::info(Event::ServerStart, &[("addr", &addr.to_string())]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Logger::info(Event::ServerStop, &[("addr", &addr.to_string())]);
        Ok(())
    }
}

async fn shutdown_signal() {
    // An error here means no handler could be installed; serve until killed
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AdmissionControl;
    use crate::engine::EngineConfig;
    use crate::observability::MetricsRegistry;
    use crate::pipeline::{DefaultSourceFactory, DefinitionStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn engine(temp: &TempDir) -> Arc<QueryEngine> {
        Arc::new(QueryEngine::new(
            DefinitionStore::new(temp.path()),
            Arc::new(DefaultSourceFactory),
            AdmissionControl::new(1),
            Arc::new(MetricsRegistry::new()),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_metrics_can_be_hidden() {
        let temp = TempDir::new().unwrap();
        let config = HttpServerConfig {
            expose_metrics: false,
            ..Default::default()
        };
        let server = HttpServer::new(config, engine(&temp));
        assert!(!server.config().expose_metrics);

        let response = server
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_router_serves_health_and_queries() {
        let temp = TempDir::new().unwrap();
        let router = HttpServer::new(HttpServerConfig::default(), engine(&temp)).router();

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/query/nothing/here").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
