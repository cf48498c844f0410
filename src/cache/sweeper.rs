//! Periodic purge of expired cache entries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::response_cache::ResponseCache;
use crate::observability::{Event, Logger};

/// Run [`ResponseCache::purge_expired`] every `period` until the task is aborted
pub fn spawn_purge(cache: Arc<ResponseCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let cache = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || cache.purge_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => {
                    Logger::info(Event::CachePurge, &[("removed", &removed.to_string())]);
                }
                Ok(Err(e)) => {
                    Logger::error(Event::CachePurge, &[("error", &e.to_string())]);
                }
                Err(e) => {
                    Logger::error(Event::CachePurge, &[("error", &e.to_string())]);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheState, LocalCacheStorage, Lookup};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let temp = TempDir::new().unwrap();
        let storage = LocalCacheStorage::new(temp.path()).unwrap();
        let cache = Arc::new(ResponseCache::new(Arc::new(storage), Duration::from_secs(60)));

        match cache.lookup("old", Some(Duration::ZERO)).unwrap() {
            Lookup::Build(mut handle) => {
                handle.write(b"x");
                handle.commit().unwrap();
            }
            _ => panic!("expected build"),
        }

        let sweep = spawn_purge(Arc::clone(&cache), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        sweep.abort();

        assert!(cache.is_empty());
        assert!(!temp.path().join("old").exists());
        assert_eq!(cache.get("old").unwrap(), CacheState::Absent);
    }
}
