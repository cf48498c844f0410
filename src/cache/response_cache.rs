//! # Single-Flight Response Cache
//!
//! Per fingerprint the cache is `Absent`, `Building` or `Ready`. The
//! transition out of `Absent` happens under one lock, so concurrent first
//! requests for the same fingerprint produce exactly one builder; the rest
//! wait for its outcome.
//!
//! ```text
//! Absent --lookup--> Building --commit--> Ready --expire/delete--> Absent
//!                       |
//!                       +--fail/drop--> Absent
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use super::entry::CacheEntry;
use super::errors::{CacheError, CacheResult};
use super::storage::CacheStorage;
use crate::observability::{Event, Logger, MetricsRegistry};

/// Outcome of an in-progress build as seen by waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    Committed,
    Failed,
}

/// Point-in-time view of one fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Ready(CacheEntry),
    Building,
    Absent,
}

/// What a request should do for its fingerprint
pub enum Lookup {
    /// Serve the stored body
    Hit(CacheEntry),
    /// Another request is building; wait and look up again
    Wait(BuildWaiter),
    /// This request builds the entry
    Build(BuildHandle),
}

#[derive(Debug)]
enum Slot {
    Building(watch::Receiver<BuildState>),
    Ready(CacheEntry),
}

#[derive(Debug)]
pub struct ResponseCache {
    storage: Arc<dyn CacheStorage>,
    default_max_age: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ResponseCache {
    pub fn new(storage: Arc<dyn CacheStorage>, default_max_age: Duration) -> Self {
        Self {
            storage,
            default_max_age,
            slots: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_max_age(&self) -> Duration {
        self.default_max_age
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, HashMap<String, Slot>>> {
        self.slots.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Register every entry already present in storage as `Ready`.
    ///
    /// Recovered entries expire with the default maximum age.
    pub fn recover(&self) -> CacheResult<usize> {
        let keys = self.storage.list()?;
        let mut slots = self.lock()?;
        let mut recovered = 0;
        for key in keys {
            if let Some(modified) = self.storage.modified(&key)? {
                let entry = CacheEntry::new(key.clone(), modified, self.default_max_age);
                slots.insert(key, Slot::Ready(entry));
                recovered += 1;
            }
        }
        Logger::info(
            Event::CacheRecovered,
            &[("entries", &recovered.to_string())],
        );
        Ok(recovered)
    }

    /// Current state of `key`.
    ///
    /// A `Ready` entry whose body has expired or disappeared from storage is
    /// dropped and reported as `Absent`.
    pub fn get(&self, key: &str) -> CacheResult<CacheState> {
        let mut slots = self.lock()?;
        Ok(match self.validate(&mut slots, key)? {
            Some(Slot::Ready(entry)) => CacheState::Ready(entry.clone()),
            Some(Slot::Building(_)) => CacheState::Building,
            None => CacheState::Absent,
        })
    }

    /// Atomically decide between serving, waiting and building.
    ///
    /// `max_age` applies to the entry if this call becomes its builder.
    pub fn lookup(self: &Arc<Self>, key: &str, max_age: Option<Duration>) -> CacheResult<Lookup> {
        let mut slots = self.lock()?;
        match self.validate(&mut slots, key)? {
            Some(Slot::Ready(entry)) => {
                let entry = entry.clone();
                drop(slots);
                if let Some(metrics) = &self.metrics {
                    metrics.increment_cache_hits();
                }
                Logger::trace(Event::CacheHit, &[("key", key)]);
                return Ok(Lookup::Hit(entry));
            }
            Some(Slot::Building(rx)) => {
                let rx = rx.clone();
                drop(slots);
                if let Some(metrics) = &self.metrics {
                    metrics.increment_cache_waits();
                }
                Logger::trace(Event::CacheWait, &[("key", key)]);
                return Ok(Lookup::Wait(BuildWaiter { rx }));
            }
            None => {}
        }

        let writer = self.storage.create(key)?;
        let (tx, rx) = watch::channel(BuildState::Pending);
        slots.insert(key.to_string(), Slot::Building(rx));
        drop(slots);

        if let Some(metrics) = &self.metrics {
            metrics.increment_cache_misses();
        }
        Logger::trace(Event::CacheBuildBegin, &[("key", key)]);
        Ok(Lookup::Build(BuildHandle {
            cache: Arc::clone(self),
            key: key.to_string(),
            max_age: max_age.unwrap_or(self.default_max_age),
            writer: Some(writer),
            tx,
            finished: false,
        }))
    }

    /// Open the stored body of a hit, `None` if it vanished since lookup
    pub fn open(&self, entry: &CacheEntry) -> CacheResult<Option<Box<dyn Read + Send>>> {
        let body = self.storage.open(entry.key())?;
        if body.is_none() {
            self.forget(entry.key())?;
        }
        Ok(body)
    }

    /// Remove every expired entry from the index and from storage
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = SystemTime::now();
        let mut slots = self.lock()?;
        let expired: Vec<String> = slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready(entry) if entry.is_expired(now) => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in &expired {
            slots.remove(key);
            self.storage.delete(key)?;
        }
        Ok(expired.len())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&self, key: &str) -> CacheResult<()> {
        let mut slots = self.lock()?;
        if matches!(slots.get(key), Some(Slot::Ready(_))) {
            slots.remove(key);
            Logger::warn(Event::CacheEntryMissing, &[("key", key)]);
        }
        Ok(())
    }

    /// Drop stale `Ready` slots, then return what is left
    fn validate<'a>(
        &self,
        slots: &'a mut HashMap<String, Slot>,
        key: &str,
    ) -> CacheResult<Option<&'a Slot>> {
        let stale = match slots.get(key) {
            Some(Slot::Ready(entry)) => {
                if entry.is_expired(SystemTime::now()) {
                    self.storage.delete(key)?;
                    Logger::trace(Event::CacheEntryExpired, &[("key", key)]);
                    true
                } else if self.storage.modified(key)?.is_none() {
                    Logger::warn(Event::CacheEntryMissing, &[("key", key)]);
                    true
                } else {
                    false
                }
            }
            _ => false,
        };
        if stale {
            slots.remove(key);
        }
        Ok(slots.get(key))
    }

    fn finish_build(&self, key: &str, entry: Option<CacheEntry>) {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entry {
            Some(entry) => {
                slots.insert(key.to_string(), Slot::Ready(entry));
            }
            None => {
                slots.remove(key);
            }
        }
    }
}

/// Waits for another request's build to finish
pub struct BuildWaiter {
    rx: watch::Receiver<BuildState>,
}

impl BuildWaiter {
    /// Resolves once the build commits or fails.
    ///
    /// A builder that disappears without reporting counts as failed.
    pub async fn wait(mut self) -> BuildState {
        loop {
            let state = *self.rx.borrow_and_update();
            if state != BuildState::Pending {
                return state;
            }
            if self.rx.changed().await.is_err() {
                return BuildState::Failed;
            }
        }
    }
}

/// Exclusive right to build one entry.
///
/// Bytes written here go to storage. Dropping the handle without
/// committing fails the build.
pub struct BuildHandle {
    cache: Arc<ResponseCache>,
    key: String,
    max_age: Duration,
    writer: Option<Box<dyn Write + Send>>,
    tx: watch::Sender<BuildState>,
    finished: bool,
}

impl BuildHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// False once a storage write has failed
    pub fn is_caching(&self) -> bool {
        self.writer.is_some()
    }

    /// Append response bytes.
    ///
    /// A storage failure stops caching for this build but is not returned;
    /// the response itself carries on.
    pub fn write(&mut self, bytes: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_all(bytes) {
            self.abandon_storage(&e.to_string());
        }
    }

    fn abandon_storage(&mut self, reason: &str) {
        self.writer = None;
        self.cache.storage.discard(&self.key);
        Logger::warn(
            Event::CacheWriteFailed,
            &[("key", &self.key), ("reason", reason)],
        );
    }

    /// Publish the entry and wake waiters.
    ///
    /// Returns `None` if storage failed during the build; the build is then
    /// reported to waiters as failed.
    pub fn commit(mut self) -> Option<CacheEntry> {
        self.finished = true;
        let Some(mut writer) = self.writer.take() else {
            self.complete_failed("storage write failed");
            return None;
        };
        if let Err(e) = writer.flush() {
            drop(writer);
            self.cache.storage.discard(&self.key);
            self.complete_failed(&e.to_string());
            return None;
        }
        drop(writer);

        match self.cache.storage.publish(&self.key) {
            Ok(modified) => {
                let entry = CacheEntry::new(self.key.clone(), modified, self.max_age);
                self.cache.finish_build(&self.key, Some(entry.clone()));
                let _ = self.tx.send(BuildState::Committed);
                if let Some(metrics) = &self.cache.metrics {
                    metrics.increment_builds_committed();
                }
                Logger::trace(Event::CacheCommit, &[("key", &self.key)]);
                Some(entry)
            }
            Err(e) => {
                self.cache.storage.discard(&self.key);
                self.complete_failed(&e.to_string());
                None
            }
        }
    }

    /// Abandon the build; the next request for the key rebuilds it
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        self.writer = None;
        self.cache.storage.discard(&self.key);
        self.complete_failed(reason);
    }

    fn complete_failed(&self, reason: &str) {
        self.cache.finish_build(&self.key, None);
        let _ = self.tx.send(BuildState::Failed);
        if let Some(metrics) = &self.cache.metrics {
            metrics.increment_builds_failed();
        }
        Logger::warn(
            Event::CacheBuildFailed,
            &[("key", &self.key), ("reason", reason)],
        );
    }
}

impl Drop for BuildHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.writer = None;
            self.cache.storage.discard(&self.key);
            self.complete_failed("abandoned");
        }
    }
}
