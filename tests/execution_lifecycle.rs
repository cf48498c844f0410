//! How an execution ends
//!
//! Whether a response completes, the client goes away or the deadline
//! passes, the admission slot is released, the cache build is abandoned
//! rather than left building, and no spill files remain.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pipequery::bridge::BridgeConfig;
use pipequery::cache::{AdmissionControl, LocalCacheStorage, ResponseCache};
use pipequery::engine::{EngineConfig, QueryEngine, QueryRequest, QueryResponse};
use pipequery::observability::MetricsRegistry;
use pipequery::pipeline::{DefaultSourceFactory, DefinitionStore};
use pipequery::sort::SortConfig;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

struct Fixture {
    _temp: TempDir,
    spill_parent: PathBuf,
    metrics: Arc<MetricsRegistry>,
    engine: QueryEngine,
}

impl Fixture {
    fn new(bridge: BridgeConfig, timeout: Option<Duration>, sort_threshold: usize) -> Self {
        let temp = TempDir::new().unwrap();
        let defs = temp.path().join("defs");
        fs::create_dir_all(&defs).unwrap();
        fs::write(
            defs.join("fast.json"),
            r#"{"source": {"type": "test", "row_count": 200}}"#,
        )
        .unwrap();
        fs::write(
            defs.join("slow.json"),
            r#"{"source": {"type": "test", "row_count": 400, "delay_ms": 2}}"#,
        )
        .unwrap();
        let spill_parent = temp.path().join("spill");
        fs::create_dir_all(&spill_parent).unwrap();

        let metrics = Arc::new(MetricsRegistry::new());
        let storage = LocalCacheStorage::new(temp.path().join("cache")).unwrap();
        let cache = ResponseCache::new(Arc::new(storage), Duration::from_secs(60))
            .with_metrics(Arc::clone(&metrics));
        let config = EngineConfig {
            sort: SortConfig {
                memory_threshold_bytes: sort_threshold,
                temp_dir: Some(spill_parent.clone()),
            },
            bridge,
            timeout,
        };
        let engine = QueryEngine::new(
            DefinitionStore::new(&defs),
            Arc::new(DefaultSourceFactory),
            AdmissionControl::new(1),
            Arc::clone(&metrics),
            config,
        )
        .with_cache(Arc::new(cache));

        Self {
            _temp: temp,
            spill_parent,
            metrics,
            engine,
        }
    }

    /// True once nothing holds a slot or a build for `path`
    fn released(&self, path: &str) -> bool {
        self.engine.admission().in_flight(path) == 0
            && self.engine.cache().map_or(true, |cache| cache.is_empty())
    }
}

fn tight_bridge(high_water_mark: usize) -> BridgeConfig {
    BridgeConfig {
        high_water_mark,
        flush_threshold_bytes: 1,
        consumer_queue_chunks: 1,
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

/// Poll `condition` for up to three seconds
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn expected_body(rows: u64) -> String {
    let mut body = String::from("\"value\"\n");
    for value in 0..rows {
        body.push_str(&format!("{}\n", value));
    }
    body
}

// =============================================================================
// A full bridge does not hold back the response
// =============================================================================

#[tokio::test]
async fn test_response_starts_when_first_chunk_fills_the_bridge() {
    let fixture = Fixture::new(tight_bridge(16), None, usize::MAX);

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        fixture.engine.execute(QueryRequest::new("fast")),
    )
    .await
    .expect("execute never returned")
    .unwrap();
    let body = match response {
        QueryResponse::Stream { body, .. } => body.collect().await.unwrap(),
        QueryResponse::NotModified { .. } => panic!("unexpected 304"),
    };

    assert_eq!(String::from_utf8(body).unwrap(), expected_body(200));
    assert!(eventually(|| fixture.engine.admission().in_flight("fast") == 0).await);
}

// =============================================================================
// Client disconnect
// =============================================================================

#[tokio::test]
async fn test_disconnect_mid_sort_releases_everything() {
    // Room for the header so the producer keeps reading rows
    let bridge = BridgeConfig {
        consumer_queue_chunks: 64,
        ..tight_bridge(16)
    };
    let fixture = Fixture::new(bridge, None, 64);

    let request = QueryRequest::new("slow").argument("_sort", "-value");
    let body = match fixture.engine.execute(request).await.unwrap() {
        QueryResponse::Stream { body, .. } => body,
        QueryResponse::NotModified { .. } => panic!("unexpected 304"),
    };
    // The sort has written runs by now
    assert!(eventually(|| !is_empty_dir(&fixture.spill_parent)).await);
    assert!(!fixture.released("slow"));

    drop(body);

    assert!(eventually(|| fixture.released("slow")).await);
    assert!(is_empty_dir(&fixture.spill_parent));
    let snapshot = fixture.metrics.snapshot();
    assert_eq!(snapshot.executions_cancelled, 1);
    assert_eq!(snapshot.builds_failed, 1);
    assert_eq!(snapshot.builds_committed, 0);
}

// =============================================================================
// Execution timeout
// =============================================================================

#[tokio::test]
async fn test_timeout_before_first_byte_is_a_clean_error() {
    let fixture = Fixture::new(
        BridgeConfig::default(),
        Some(Duration::from_millis(100)),
        usize::MAX,
    );

    let request = QueryRequest::new("slow").argument("_sort", "value");
    let err = fixture.engine.execute(request).await.err().unwrap();

    assert_eq!(err.status_code(), 500);
    assert!(
        err.to_string().starts_with("Execution timed out after"),
        "{}",
        err
    );
    assert!(eventually(|| fixture.released("slow")).await);
    assert_eq!(fixture.metrics.snapshot().executions_failed, 1);
}

#[tokio::test]
async fn test_timeout_while_client_stops_reading() {
    let fixture = Fixture::new(tight_bridge(1), Some(Duration::from_millis(300)), usize::MAX);

    let body = match fixture.engine.execute(QueryRequest::new("fast")).await.unwrap() {
        QueryResponse::Stream { body, .. } => body,
        QueryResponse::NotModified { .. } => panic!("unexpected 304"),
    };

    // Nothing reads, so the producer stays parked until its deadline
    assert!(eventually(|| fixture.released("fast")).await);

    let err = body.collect().await.unwrap_err();
    assert!(err.to_string().contains("Execution timed out"), "{}", err);
    let snapshot = fixture.metrics.snapshot();
    assert_eq!(snapshot.executions_failed, 1);
    assert_eq!(snapshot.builds_failed, 1);
}
