//! # Cache Storage
//!
//! Durable byte storage keyed by fingerprint. Entries are written to a
//! `<key>.partial` file and renamed into place on publish, so a reader
//! never sees a half-written entry.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::errors::{CacheError, CacheResult};

const PARTIAL_SUFFIX: &str = ".partial";

/// Backend trait for cached response bodies
pub trait CacheStorage: Send + Sync + fmt::Debug {
    /// Start writing a new entry
    fn create(&self, key: &str) -> CacheResult<Box<dyn Write + Send>>;

    /// Make a fully written entry visible; returns its modification time
    fn publish(&self, key: &str) -> CacheResult<SystemTime>;

    /// Remove a partially written entry
    fn discard(&self, key: &str);

    /// Open a published entry, `None` if it no longer exists
    fn open(&self, key: &str) -> CacheResult<Option<Box<dyn Read + Send>>>;

    /// Modification time of a published entry, `None` if it no longer exists
    fn modified(&self, key: &str) -> CacheResult<Option<SystemTime>>;

    /// Delete a published entry; missing entries are not an error
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Keys of every published entry
    fn list(&self) -> CacheResult<Vec<String>>;
}

/// Local filesystem cache storage
#[derive(Debug)]
pub struct LocalCacheStorage {
    root: PathBuf,
}

impl LocalCacheStorage {
    /// Create the storage, creating `root` if needed.
    ///
    /// Leftover partial files from an earlier process are removed.
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(root.display().to_string(), e))?;
        let storage = Self { root };
        storage.remove_partials()?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn partial_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{}", key, PARTIAL_SUFFIX))
    }

    fn file_names(&self) -> CacheResult<Vec<String>> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| CacheError::io(self.root.display().to_string(), e))?;
        let mut names = Vec::new();
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn remove_partials(&self) -> CacheResult<()> {
        for name in self.file_names()? {
            if name.ends_with(PARTIAL_SUFFIX) {
                let _ = fs::remove_file(self.root.join(&name));
            }
        }
        Ok(())
    }
}

fn not_found_as_none<T>(key: &str, result: io::Result<T>) -> CacheResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(key, e)),
    }
}

impl CacheStorage for LocalCacheStorage {
    fn create(&self, key: &str) -> CacheResult<Box<dyn Write + Send>> {
        let file = File::create(self.partial_path(key)).map_err(|e| CacheError::io(key, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn publish(&self, key: &str) -> CacheResult<SystemTime> {
        let target = self.path(key);
        fs::rename(self.partial_path(key), &target).map_err(|e| CacheError::io(key, e))?;
        fs::metadata(&target)
            .and_then(|m| m.modified())
            .map_err(|e| CacheError::io(key, e))
    }

    fn discard(&self, key: &str) {
        let _ = fs::remove_file(self.partial_path(key));
    }

    fn open(&self, key: &str) -> CacheResult<Option<Box<dyn Read + Send>>> {
        let file = not_found_as_none(key, File::open(self.path(key)))?;
        Ok(file.map(|f| Box::new(f) as Box<dyn Read + Send>))
    }

    fn modified(&self, key: &str) -> CacheResult<Option<SystemTime>> {
        let metadata = not_found_as_none(key, fs::metadata(self.path(key)))?;
        metadata
            .map(|m| m.modified().map_err(|e| CacheError::io(key, e)))
            .transpose()
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        not_found_as_none(key, fs::remove_file(self.path(key))).map(|_| ())
    }

    fn list(&self) -> CacheResult<Vec<String>> {
        Ok(self
            .file_names()?
            .into_iter()
            .filter(|name| !name.ends_with(PARTIAL_SUFFIX))
            .collect())
    }
}
