//! # Response Cache and Admission Control
//!
//! Identical requests are fingerprinted and served from one stored body.
//! Only a confirmed miss consumes an admission slot.

mod admission;
mod entry;
mod errors;
mod fingerprint;
mod response_cache;
mod storage;
mod sweeper;

pub use admission::{AdmissionControl, AdmissionPermit};
pub use entry::{format_http_date, parse_http_date, CacheEntry};
pub use errors::{AdmissionError, AdmissionResult, CacheError, CacheResult};
pub use fingerprint::{Fingerprint, FingerprintBuilder, Identity};
pub use response_cache::{BuildHandle, BuildState, BuildWaiter, CacheState, Lookup, ResponseCache};
pub use storage::{CacheStorage, LocalCacheStorage};
pub use sweeper::spawn_purge;
