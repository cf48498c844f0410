//! Published cache entries and HTTP date handling

use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};

/// RFC 7231 IMF-fixdate
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A response body that has been fully written to cache storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: String,
    modified: SystemTime,
    max_age: Duration,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, modified: SystemTime, max_age: Duration) -> Self {
        Self {
            key: key.into(),
            modified,
            max_age,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.modified)
    }

    /// `Last-Modified` header value
    pub fn last_modified_header(&self) -> String {
        format_http_date(self.last_modified())
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now.duration_since(self.modified)
            .map(|age| age > self.max_age)
            .unwrap_or(false)
    }

    /// True if a client holding a copy from `since` can be told it is current.
    ///
    /// HTTP dates carry whole seconds, so the comparison drops sub-second
    /// precision from the entry timestamp.
    pub fn not_modified_since(&self, since: DateTime<Utc>) -> bool {
        since.timestamp() >= self.last_modified().timestamp()
    }
}

pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
