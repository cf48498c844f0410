//! Memory-bounded external sort
//!
//! Rows accumulate in memory until their estimated size would reach the
//! threshold; the buffer is then sorted and written out as a run. At the
//! end the runs and the in-memory remainder are k-way merged. Ties across
//! runs go to the earlier run, so the result is stable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::vec;

use serde::{Deserialize, Serialize};

use crate::observability::{Event, Logger};
use crate::row::{Row, Schema, Value};

use super::comparator::RowComparator;
use super::errors::SortResult;
use super::key::SortKey;
use super::spill::{Run, RunReader, SpillDir};

/// Most runs merged at once; more are merged in consecutive groups first
pub const MAX_FAN_IN: usize = 64;

/// Default in-memory budget before spilling
pub const DEFAULT_MEMORY_THRESHOLD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default = "default_memory_threshold_bytes")]
    pub memory_threshold_bytes: usize,
    /// Parent directory for spill runs, system temp dir if unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_memory_threshold_bytes() -> usize {
    DEFAULT_MEMORY_THRESHOLD_BYTES
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            memory_threshold_bytes: DEFAULT_MEMORY_THRESHOLD_BYTES,
            temp_dir: None,
        }
    }
}

pub struct ExternalSorter {
    schema: Arc<Schema>,
    comparator: Arc<RowComparator>,
    threshold: usize,
    buffer: Vec<Vec<Value>>,
    buffered_bytes: usize,
    spill: SpillDir,
    runs: Vec<Run>,
    spills: usize,
}

impl ExternalSorter {
    /// Fails if a key names a field missing from `schema`
    pub fn new(schema: Arc<Schema>, keys: &[SortKey], config: &SortConfig) -> SortResult<Self> {
        let comparator = RowComparator::new(&schema, keys)?;
        Ok(Self {
            schema,
            comparator: Arc::new(comparator),
            threshold: config.memory_threshold_bytes,
            buffer: Vec::new(),
            buffered_bytes: 0,
            spill: SpillDir::new(config.temp_dir.clone()),
            runs: Vec::new(),
            spills: 0,
        })
    }

    pub fn push(&mut self, row: Row) -> SortResult<()> {
        let size = row.estimated_size();
        if !self.buffer.is_empty() && self.buffered_bytes + size >= self.threshold {
            self.spill_buffer()?;
        }
        self.buffered_bytes += size;
        self.buffer.push(row.into_values());
        Ok(())
    }

    /// Number of runs written so far
    pub fn spills(&self) -> usize {
        self.spills
    }

    fn spill_buffer(&mut self) -> SortResult<()> {
        self.comparator.sort(&mut self.buffer);
        let mut writer = self.spill.create_run()?;
        for values in self.buffer.drain(..) {
            writer.write_row(&values)?;
        }
        let run = writer.finish()?;
        self.spills += 1;

        Logger::info(
            Event::SortSpill,
            &[
                ("bytes", &self.buffered_bytes.to_string()),
                ("rows", &run.rows().to_string()),
                ("run", &self.spills.to_string()),
            ],
        );

        self.buffered_bytes = 0;
        self.runs.push(run);
        Ok(())
    }

    /// Sort the remainder and return every row in order
    pub fn finish(mut self) -> SortResult<SortedRows> {
        self.comparator.sort(&mut self.buffer);
        let remainder = std::mem::take(&mut self.buffer);

        if self.runs.is_empty() {
            return Ok(SortedRows {
                schema: self.schema,
                inner: SortedInner::Memory(remainder.into_iter()),
                _spill: self.spill,
            });
        }

        let mut runs = std::mem::take(&mut self.runs);
        while runs.len() + 1 > MAX_FAN_IN {
            runs = self.merge_pass(runs)?;
        }

        let mut sources = runs
            .iter()
            .map(|run| run.open().map(RunSource::File))
            .collect::<SortResult<Vec<_>>>()?;
        sources.push(RunSource::Memory(remainder.into_iter()));
        let merge = KWayMerge::new(sources, Arc::clone(&self.comparator))?;

        Ok(SortedRows {
            schema: self.schema,
            inner: SortedInner::Merge(merge),
            _spill: self.spill,
        })
    }

    /// Merge consecutive groups of runs, preserving run order
    fn merge_pass(&mut self, runs: Vec<Run>) -> SortResult<Vec<Run>> {
        let before = runs.len();
        let mut merged = Vec::with_capacity(before / MAX_FAN_IN + 1);
        for group in runs.chunks(MAX_FAN_IN) {
            if let [single] = group {
                merged.push(single.clone());
                continue;
            }
            let sources = group
                .iter()
                .map(|run| run.open().map(RunSource::File))
                .collect::<SortResult<Vec<_>>>()?;
            let mut writer = self.spill.create_run()?;
            for values in KWayMerge::new(sources, Arc::clone(&self.comparator))? {
                writer.write_row(&values?)?;
            }
            merged.push(writer.finish()?);
            for run in group {
                // Removed with the spill directory anyway
                let _ = fs::remove_file(run.path());
            }
        }
        Logger::info(
            Event::SortMerge,
            &[
                ("runs_after", &merged.len().to_string()),
                ("runs_before", &before.to_string()),
            ],
        );
        Ok(merged)
    }
}

/// Sorted output; owns the spill directory until dropped
pub struct SortedRows {
    schema: Arc<Schema>,
    inner: SortedInner,
    _spill: SpillDir,
}

enum SortedInner {
    Memory(vec::IntoIter<Vec<Value>>),
    Merge(KWayMerge),
}

impl SortedRows {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Iterator for SortedRows {
    type Item = SortResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = match &mut self.inner {
            SortedInner::Memory(rows) => Ok(rows.next()?),
            SortedInner::Merge(merge) => merge.next()?,
        };
        Some(values.map(|values| Row::new(Arc::clone(&self.schema), values)))
    }
}

enum RunSource {
    File(RunReader),
    Memory(vec::IntoIter<Vec<Value>>),
}

impl RunSource {
    fn next_row(&mut self) -> Option<SortResult<Vec<Value>>> {
        match self {
            RunSource::File(reader) => reader.next(),
            RunSource::Memory(rows) => rows.next().map(Ok),
        }
    }
}

struct HeapEntry {
    values: Vec<Value>,
    source: usize,
    comparator: Arc<RowComparator>,
}

impl Ord for HeapEntry {
    /// Reversed so the max-heap pops the smallest row, earliest source first
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&other.values, &self.values)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

struct KWayMerge {
    sources: Vec<RunSource>,
    heap: BinaryHeap<HeapEntry>,
    comparator: Arc<RowComparator>,
    failed: bool,
}

impl KWayMerge {
    fn new(mut sources: Vec<RunSource>, comparator: Arc<RowComparator>) -> SortResult<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (idx, source) in sources.iter_mut().enumerate() {
            if let Some(values) = source.next_row() {
                heap.push(HeapEntry {
                    values: values?,
                    source: idx,
                    comparator: Arc::clone(&comparator),
                });
            }
        }
        Ok(Self {
            sources,
            heap,
            comparator,
            failed: false,
        })
    }
}

impl Iterator for KWayMerge {
    type Item = SortResult<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let entry = self.heap.pop()?;
        match self.sources[entry.source].next_row() {
            Some(Ok(values)) => self.heap.push(HeapEntry {
                values,
                source: entry.source,
                comparator: Arc::clone(&self.comparator),
            }),
            Some(Err(e)) => {
                self.failed = true;
                return Some(Err(e));
            }
            None => {}
        }
        Some(Ok(entry.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{DataType, Field};
    use crate::sort::SortError;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("seq", DataType::Long),
            Field::new("group", DataType::Long),
        ]))
    }

    fn rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(schema(), vec![Value::Long(i), Value::Long((i * 7) % 5)]))
            .collect()
    }

    fn sort_with(threshold: usize, dir: &std::path::Path, input: Vec<Row>) -> (Vec<Vec<Value>>, usize) {
        let config = SortConfig {
            memory_threshold_bytes: threshold,
            temp_dir: Some(dir.to_path_buf()),
        };
        let mut sorter = ExternalSorter::new(schema(), &[SortKey::asc("group")], &config).unwrap();
        for row in input {
            sorter.push(row).unwrap();
        }
        let spills = sorter.spills();
        let out = sorter
            .finish()
            .unwrap()
            .map(|r| r.map(Row::into_values))
            .collect::<SortResult<Vec<_>>>()
            .unwrap();
        (out, spills)
    }

    #[test]
    fn test_in_memory_sort_does_not_spill() {
        let dir = tempfile::tempdir().unwrap();
        let (out, spills) = sort_with(usize::MAX, dir.path(), rows(50));
        assert_eq!(spills, 0);
        assert_eq!(out.len(), 50);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_spilled_sort_matches_in_memory_sort() {
        let dir = tempfile::tempdir().unwrap();
        let (expected, _) = sort_with(usize::MAX, dir.path(), rows(200));
        let (actual, spills) = sort_with(200, dir.path(), rows(200));
        assert!(spills > 1);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = sort_with(100, dir.path(), rows(100));
        for pair in out.windows(2) {
            if pair[0][1] == pair[1][1] {
                assert!(pair[0][0].sort_cmp(&pair[1][0]) == Ordering::Less);
            }
        }
    }

    #[test]
    fn test_fan_in_limit_uses_intermediate_merges() {
        let dir = tempfile::tempdir().unwrap();
        // A threshold below one row spills every row into its own run
        let (out, spills) = sort_with(1, dir.path(), rows(150));
        assert!(spills > MAX_FAN_IN);
        let (expected, _) = sort_with(usize::MAX, dir.path(), rows(150));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_spill_directory_removed_after_output_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig {
            memory_threshold_bytes: 64,
            temp_dir: Some(dir.path().to_path_buf()),
        };
        let mut sorter = ExternalSorter::new(schema(), &[SortKey::desc("seq")], &config).unwrap();
        for row in rows(20) {
            sorter.push(row).unwrap();
        }
        let mut sorted = sorter.finish().unwrap();
        let first = sorted.next().unwrap().unwrap();
        assert_eq!(first.get("seq"), Some(&Value::Long(19)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        drop(sorted);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unsorted_sorter_dropped_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig {
            memory_threshold_bytes: 32,
            temp_dir: Some(dir.path().to_path_buf()),
        };
        let mut sorter = ExternalSorter::new(schema(), &[SortKey::asc("seq")], &config).unwrap();
        for row in rows(10) {
            sorter.push(row).unwrap();
        }
        assert!(sorter.spills() > 0);
        drop(sorter);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_key() {
        let err = ExternalSorter::new(schema(), &[SortKey::asc("nope")], &SortConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, SortError::UnknownField(_)));
    }
}
