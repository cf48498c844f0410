//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics, no locks

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by every execution
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests: AtomicU64,
    requests_rejected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_waits: AtomicU64,
    cache_not_modified: AtomicU64,
    builds_committed: AtomicU64,
    builds_failed: AtomicU64,
    admission_rejections: AtomicU64,
    executions_failed: AtomicU64,
    executions_cancelled: AtomicU64,
    rows_emitted: AtomicU64,
    sort_spills: AtomicU64,
    bytes_streamed: AtomicU64,
}

macro_rules! counter {
    ($increment:ident, $field:ident) => {
        pub fn $increment(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(increment_requests, requests);
    counter!(increment_requests_rejected, requests_rejected);
    counter!(increment_cache_hits, cache_hits);
    counter!(increment_cache_misses, cache_misses);
    counter!(increment_cache_waits, cache_waits);
    counter!(increment_cache_not_modified, cache_not_modified);
    counter!(increment_builds_committed, builds_committed);
    counter!(increment_builds_failed, builds_failed);
    counter!(increment_admission_rejections, admission_rejections);
    counter!(increment_executions_failed, executions_failed);
    counter!(increment_executions_cancelled, executions_cancelled);

    pub fn add_rows_emitted(&self, rows: u64) {
        self.rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_sort_spills(&self, runs: u64) {
        self.sort_spills.fetch_add(runs, Ordering::Relaxed);
    }

    pub fn add_bytes_streamed(&self, bytes: u64) {
        self.bytes_streamed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: load(&self.requests),
            requests_rejected: load(&self.requests_rejected),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            cache_waits: load(&self.cache_waits),
            cache_not_modified: load(&self.cache_not_modified),
            builds_committed: load(&self.builds_committed),
            builds_failed: load(&self.builds_failed),
            admission_rejections: load(&self.admission_rejections),
            executions_failed: load(&self.executions_failed),
            executions_cancelled: load(&self.executions_cancelled),
            rows_emitted: load(&self.rows_emitted),
            sort_spills: load(&self.sort_spills),
            bytes_streamed: load(&self.bytes_streamed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub requests_rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_waits: u64,
    pub cache_not_modified: u64,
    pub builds_committed: u64,
    pub builds_failed: u64,
    pub admission_rejections: u64,
    pub executions_failed: u64,
    pub executions_cancelled: u64,
    pub rows_emitted: u64,
    pub sort_spills: u64,
    pub bytes_streamed: u64,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.bytes_streamed, 0);
    }

    #[test]
    fn test_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_requests();
        registry.increment_requests();
        registry.increment_cache_hits();
        registry.add_rows_emitted(12);
        registry.add_bytes_streamed(1024);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.rows_emitted, 12);
        assert_eq!(snapshot.bytes_streamed, 1024);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.add_sort_spills(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().sort_spills, 4000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(MetricsRegistry::new().snapshot()).unwrap();
        assert_eq!(json["admission_rejections"], 0);
    }
}
