//! Durable key to byte-blob storage used as the offline fallback for the last good payload.
//!
//! Caches are best-effort: read failures look like a missing key and write failures are logged
//! and otherwise ignored.
use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tempfile::NamedTempFile;

/// Key under which the last successfully decoded features payload is stored.
pub const FEATURE_CACHE_KEY: &str = "gb-features.txt";

/// Key to byte-blob persistence.
pub trait FeatureCache: Send + Sync {
    /// Return the bytes stored under `key`, or `None` if there are none (or they can't be read).
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `bytes` under `key`, overwriting any previous value.
    fn put(&self, key: &str, bytes: &[u8]);
}

/// A cache that stores one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `directory`. The directory is created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> FileCache {
        FileCache {
            directory: directory.into(),
        }
    }

    /// Create a cache in the platform cache directory (e.g. `~/.cache/growthbook` on Linux),
    /// falling back to the system temporary directory.
    pub fn in_default_location() -> FileCache {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        FileCache::new(base.join("growthbook"))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file backing `key`. Path separators and other unsafe characters are replaced
    /// so that every key maps to a file directly inside the cache directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        match file_name.trim_start_matches('.') {
            "" => self.directory.join("_"),
            name => self.directory.join(name),
        }
    }

    fn write_atomic(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        // Every write gets its own temporary file, so concurrent writers never share one.
        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(bytes)?;
        let _ = tmp.as_file().sync_all();
        tmp.persist(self.path_for(key)).map_err(|err| err.error)?;
        Ok(())
    }
}

impl Default for FileCache {
    fn default() -> FileCache {
        FileCache::in_default_location()
    }
}

impl FeatureCache for FileCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!(target: "growthbook", key; "failed to read cache entry: {:?}", err);
                None
            }
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) {
        if let Err(err) = self.write_atomic(key, bytes) {
            log::warn!(target: "growthbook", key; "failed to write cache entry: {:?}", err);
        }
    }
}

/// An in-memory cache. Useful in tests and for processes that must not touch the disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }
}

impl FeatureCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), bytes.to_vec());
        }
    }
}
