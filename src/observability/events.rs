//! Observable events
//!
//! Every log line carries one of these as its `event` field.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ServerStart,
    ServerStop,
    ConfigLoaded,

    // Requests
    RequestReceived,
    RequestRejected,

    // Response cache
    CacheHit,
    CacheWait,
    CacheNotModified,
    CacheBuildBegin,
    CacheCommit,
    CacheBuildFailed,
    CacheWriteFailed,
    CacheEntryMissing,
    CacheEntryExpired,
    CachePurge,
    CacheRecovered,

    // Admission control
    AdmissionRejected,

    // Execution
    SortSpill,
    SortMerge,
    ExecutionComplete,
    ExecutionFailed,
    ExecutionCancelled,
    StreamTruncated,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ServerStart => "SERVER_START",
            Event::ServerStop => "SERVER_STOP",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RequestReceived => "REQUEST_RECEIVED",
            Event::RequestRejected => "REQUEST_REJECTED",
            Event::CacheHit => "CACHE_HIT",
            Event::CacheWait => "CACHE_WAIT",
            Event::CacheNotModified => "CACHE_NOT_MODIFIED",
            Event::CacheBuildBegin => "CACHE_BUILD_BEGIN",
            Event::CacheCommit => "CACHE_COMMIT",
            Event::CacheBuildFailed => "CACHE_BUILD_FAILED",
            Event::CacheWriteFailed => "CACHE_WRITE_FAILED",
            Event::CacheEntryMissing => "CACHE_ENTRY_MISSING",
            Event::CacheEntryExpired => "CACHE_ENTRY_EXPIRED",
            Event::CachePurge => "CACHE_PURGE",
            Event::CacheRecovered => "CACHE_RECOVERED",
            Event::AdmissionRejected => "ADMISSION_REJECTED",
            Event::SortSpill => "SORT_SPILL",
            Event::SortMerge => "SORT_MERGE",
            Event::ExecutionComplete => "EXECUTION_COMPLETE",
            Event::ExecutionFailed => "EXECUTION_FAILED",
            Event::ExecutionCancelled => "EXECUTION_CANCELLED",
            Event::StreamTruncated => "STREAM_TRUNCATED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
