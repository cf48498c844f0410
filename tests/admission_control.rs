//! Admission control for concurrent builds
//!
//! Builds of one pipeline beyond its concurrency limit are rejected with
//! 429 instead of queueing; the slot frees once the running build ends.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pipequery::cache::AdmissionControl;
use pipequery::engine::{EngineConfig, EngineError, QueryEngine, QueryRequest, QueryResponse};
use pipequery::http_server::{HttpServer, HttpServerConfig};
use pipequery::observability::MetricsRegistry;
use pipequery::pipeline::{DefaultSourceFactory, DefinitionStore};
use tempfile::TempDir;
use tower::ServiceExt;

// =============================================================================
// Test Utilities
// =============================================================================

fn engine(temp: &TempDir, default_limit: usize) -> Arc<QueryEngine> {
    let defs = temp.path().join("defs");
    fs::create_dir_all(&defs).unwrap();
    fs::write(
        defs.join("slow.json"),
        r#"{"source": {"type": "test", "row_count": 20, "delay_ms": 20}}"#,
    )
    .unwrap();
    fs::write(
        defs.join("wide.json"),
        r#"{"source": {"type": "test", "row_count": 20, "delay_ms": 20}, "max_concurrent": 2}"#,
    )
    .unwrap();

    Arc::new(QueryEngine::new(
        DefinitionStore::new(&defs),
        Arc::new(DefaultSourceFactory),
        AdmissionControl::new(default_limit),
        Arc::new(MetricsRegistry::new()),
        EngineConfig::default(),
    ))
}

async fn collect(result: Result<QueryResponse, EngineError>) -> Result<String, EngineError> {
    match result? {
        QueryResponse::Stream { body, .. } => {
            Ok(String::from_utf8(body.collect().await.unwrap()).unwrap())
        }
        QueryResponse::NotModified { .. } => panic!("unexpected 304"),
    }
}

async fn run(engine: &QueryEngine, path: &str, limit: &str) -> Result<String, EngineError> {
    let request = QueryRequest::new(path).argument("_limit", limit);
    collect(engine.execute(request).await).await
}

async fn get(router: Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

// =============================================================================
// Limits
// =============================================================================

#[tokio::test]
async fn test_second_concurrent_build_is_rejected() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);

    let (first, second) = tokio::join!(run(&engine, "slow", "5"), run(&engine, "slow", "6"));

    assert_eq!(first.unwrap().lines().count(), 6);
    let err = second.unwrap_err();
    assert_eq!(err.status_code(), 429);
    assert_eq!(err.to_string(), "Too many concurrent requests");
    assert_eq!(engine.metrics().snapshot().admission_rejections, 1);
}

#[tokio::test]
async fn test_rejection_over_http() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);
    let router = HttpServer::new(HttpServerConfig::default(), engine).router();

    let (first, second) = tokio::join!(
        get(router.clone(), "/query/slow?_limit=5"),
        get(router.clone(), "/query/slow?_limit=6"),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.1, "Too many concurrent requests");
}

#[tokio::test]
async fn test_definition_limit_overrides_default() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);

    let (first, second) = tokio::join!(run(&engine, "wide", "3"), run(&engine, "wide", "4"));

    assert_eq!(first.unwrap().lines().count(), 4);
    assert_eq!(second.unwrap().lines().count(), 5);
}

#[tokio::test]
async fn test_limits_are_per_pipeline() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);

    let (slow, wide) = tokio::join!(run(&engine, "slow", "3"), run(&engine, "wide", "3"));

    assert!(slow.is_ok());
    assert!(wide.is_ok());
}

#[tokio::test]
async fn test_slot_frees_after_build_ends() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);

    run(&engine, "slow", "2").await.unwrap();

    // The permit is released on the producer thread just after the body ends
    for _ in 0..100 {
        match run(&engine, "slow", "3").await {
            Ok(body) => {
                assert_eq!(body.lines().count(), 4);
                return;
            }
            Err(err) => assert_eq!(err.status_code(), 429),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("admission slot was never released");
}
