//! # External Sort
//!
//! Multi-key, stable, memory-bounded sorting of row streams.
//!
//! - [`RowComparator`] resolves keys against a schema and orders rows
//! - [`ExternalSorter`] buffers rows and spills sorted runs past a byte threshold
//! - [`SortedRows`] yields the merged result and owns the spill directory

mod comparator;
mod errors;
mod external;
mod key;
mod spill;

pub use comparator::RowComparator;
pub use errors::{SortError, SortResult};
pub use external::{
    ExternalSorter, SortConfig, SortedRows, DEFAULT_MEMORY_THRESHOLD_BYTES, MAX_FAN_IN,
};
pub use key::{SortDirection, SortKey};
