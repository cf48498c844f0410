//! # Observability
//!
//! - Structured logging (one JSON object per line)
//! - Monotonic counters exposed through `/metrics`
//! - Begin/complete scopes around executions
//!
//! ```ignore
//! use pipequery::observability::{Event, Logger, MetricsRegistry, ObservationScope};
//!
//! Logger::info(Event::CacheHit, &[("path", "sales/daily")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_cache_hits();
//!
//! let scope = ObservationScope::new("QUERY");
//! scope.complete(&[("rows", "12")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;
