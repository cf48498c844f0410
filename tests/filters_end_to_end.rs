//! Filter arguments applied over HTTP
//!
//! Each test serves a 21-row generated pipeline through the full router:
//! argument compilation, stage chain, delimited output and status mapping.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pipequery::cache::AdmissionControl;
use pipequery::engine::{EngineConfig, QueryEngine};
use pipequery::http_server::{HttpServer, HttpServerConfig};
use pipequery::observability::MetricsRegistry;
use pipequery::pipeline::{DefaultSourceFactory, DefinitionStore};
use tempfile::TempDir;
use tower::ServiceExt;

// =============================================================================
// Test Utilities
// =============================================================================

fn write_definitions(root: &Path) {
    let dir = root.join("demo");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("numbers.json"),
        r#"{
            "source": {"type": "test", "row_count": 21, "name": "n"},
            "formats": ["tsv", "csv", "json"]
        }"#,
    )
    .unwrap();
}

fn router(temp: &TempDir) -> Router {
    write_definitions(temp.path());
    let engine = QueryEngine::new(
        DefinitionStore::new(temp.path()),
        Arc::new(DefaultSourceFactory),
        AdmissionControl::new(4),
        Arc::new(MetricsRegistry::new()),
        EngineConfig::default(),
    );
    HttpServer::new(HttpServerConfig::default(), Arc::new(engine)).router()
}

async fn get(temp: &TempDir, uri: &str) -> (StatusCode, String) {
    let response = router(temp)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn lines(body: &str) -> Vec<&str> {
    body.lines().collect()
}

// =============================================================================
// Row windowing
// =============================================================================

#[tokio::test]
async fn test_unfiltered_returns_every_row() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&body).len(), 22);
    assert_eq!(lines(&body)[0], "\"value\"\t\"name\"");
    assert_eq!(lines(&body)[1], "0\t\"n\"");
}

#[tokio::test]
async fn test_limit_caps_rows() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers?_limit=12").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&body).len(), 13);
}

#[tokio::test]
async fn test_non_numeric_limit_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers?_limit=bob").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "Invalid argument to _limit filter, should be an integer"
    );
}

#[tokio::test]
async fn test_offset_applies_before_limit() {
    let temp = TempDir::new().unwrap();
    // Argument order in the URL does not matter
    let (_, body) = get(&temp, "/query/demo/numbers.csv?_limit=3&_offset=5&_without=name").await;

    assert_eq!(lines(&body), vec!["\"value\"", "5", "6", "7"]);
}

#[tokio::test]
async fn test_offset_one_limit_twelve() {
    let temp = TempDir::new().unwrap();
    let (_, body) = get(&temp, "/query/demo/numbers.csv?_offset=1&_limit=12&_without=name").await;

    let expected: Vec<String> = std::iter::once("\"value\"".to_string())
        .chain((1..=12).map(|v| v.to_string()))
        .collect();
    assert_eq!(lines(&body), expected);
}

// =============================================================================
// Predicates and ordering
// =============================================================================

#[tokio::test]
async fn test_query_filters_before_sort_and_limit() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(
        &temp,
        "/query/demo/numbers.csv?_limit=2&_sort=-value&_query=value%3Dlt%3D10&_without=name",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&body), vec!["\"value\"", "9", "8"]);
}

#[tokio::test]
async fn test_or_expression() {
    let temp = TempDir::new().unwrap();
    let (_, body) = get(
        &temp,
        "/query/demo/numbers.csv?_query=value%3D%3D3%2Cvalue%3D%3D17&_without=name",
    )
    .await;

    assert_eq!(lines(&body), vec!["\"value\"", "3", "17"]);
}

#[tokio::test]
async fn test_invalid_expression_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers?_query=value%3D%3D").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("_query"));
}

#[tokio::test]
async fn test_unknown_sort_field_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, _) = get(&temp, "/query/demo/numbers?_sort=missing").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Field projection
// =============================================================================

#[tokio::test]
async fn test_map_renames_and_drops() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers.csv?_map=value%3Aid+name%3A&_limit=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&body), vec!["\"id\"", "0"]);
}

#[tokio::test]
async fn test_relabel_keeps_all_fields() {
    let temp = TempDir::new().unwrap();
    let (_, body) = get(&temp, "/query/demo/numbers.csv?_relabel=name%3Alabel&_limit=1").await;

    assert_eq!(lines(&body), vec!["\"value\",\"label\"", "0,\"n\""]);
}

#[tokio::test]
async fn test_relabel_cannot_drop() {
    let temp = TempDir::new().unwrap();
    let (status, _) = get(&temp, "/query/demo/numbers?_relabel=name%3A").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_json_output() {
    let temp = TempDir::new().unwrap();
    let (status, body) = get(&temp, "/query/demo/numbers.json?_limit=2&_without=name").await;

    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed, serde_json::json!([{"value": 0}, {"value": 1}]));
}
