//! Multi-key row comparator
//!
//! Keys are compared in order; the first non-equal key decides. Nulls sort
//! before every other value, then values order by [`Value::sort_cmp`].

use std::cmp::Ordering;

use crate::row::{Schema, Value};

use super::errors::{SortError, SortResult};
use super::key::{SortDirection, SortKey};

#[derive(Debug, Clone)]
pub struct RowComparator {
    columns: Vec<(usize, SortDirection)>,
}

impl RowComparator {
    /// Resolve sort keys against a schema.
    pub fn new(schema: &Schema, keys: &[SortKey]) -> SortResult<Self> {
        let columns = keys
            .iter()
            .map(|key| {
                schema
                    .index_of(&key.field)
                    .map(|idx| (idx, key.direction))
                    .ok_or_else(|| SortError::UnknownField(key.field.clone()))
            })
            .collect::<SortResult<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for &(idx, direction) in &self.columns {
            let ordering = match (a.get(idx), b.get(idx)) {
                (Some(x), Some(y)) => x.sort_cmp(y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort
    pub fn sort(&self, rows: &mut [Vec<Value>]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}
