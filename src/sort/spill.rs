//! Scoped spill directory and run files
//!
//! One [`SpillDir`] per sort. The directory is created on the first spill
//! and removed with every run in it when the `SpillDir` is dropped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::row::Value;

use super::errors::{SortError, SortResult};

pub struct SpillDir {
    parent: Option<PathBuf>,
    dir: Option<TempDir>,
    next_run: usize,
}

impl SpillDir {
    /// `parent` of `None` uses the system temp directory
    pub fn new(parent: Option<PathBuf>) -> Self {
        Self {
            parent,
            dir: None,
            next_run: 0,
        }
    }

    /// Directory holding the runs, if any have been written
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn ensure_dir(&mut self) -> SortResult<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.path().to_path_buf());
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix("pipequery-sort-");
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| SortError::io(self.parent.clone().unwrap_or_else(std::env::temp_dir), e))?;
        let path = dir.path().to_path_buf();
        self.dir = Some(dir);
        Ok(path)
    }

    /// Create the next run file
    pub fn create_run(&mut self) -> SortResult<RunWriter> {
        let id = self.next_run;
        self.next_run += 1;
        let path = self.ensure_dir()?.join(format!("run-{:06}.jsonl", id));
        RunWriter::create(path)
    }
}

/// Sorted rows written one JSON array per line
pub struct RunWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl RunWriter {
    fn create(path: PathBuf) -> SortResult<Self> {
        let file = File::create(&path).map_err(|e| SortError::io(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    pub fn write_row(&mut self, values: &[Value]) -> SortResult<()> {
        serde_json::to_writer(&mut self.writer, values).map_err(|e| SortError::CorruptRun {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| SortError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the finished run
    pub fn finish(mut self) -> SortResult<Run> {
        self.writer
            .flush()
            .map_err(|e| SortError::io(&self.path, e))?;
        Ok(Run {
            path: self.path,
            rows: self.rows,
        })
    }
}

/// A finished run on disk
#[derive(Debug, Clone)]
pub struct Run {
    path: PathBuf,
    rows: usize,
}

impl Run {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn open(&self) -> SortResult<RunReader> {
        let file = File::open(&self.path).map_err(|e| SortError::io(&self.path, e))?;
        Ok(RunReader {
            path: self.path.clone(),
            lines: BufReader::new(file).lines(),
        })
    }
}

pub struct RunReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl Iterator for RunReader {
    type Item = SortResult<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(SortError::io(&self.path, e))),
        };
        Some(
            serde_json::from_str(&line).map_err(|e| SortError::CorruptRun {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        )
    }
}
