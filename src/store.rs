//! Persisted key-value byte store backing the history ledger and preferences.
//!
//! Only two keys are ever used ([`HISTORY_KEY`] and [`THEME_KEY`]). Values are
//! opaque bytes; the owners decide the encoding.
//!
//! [`FileStore`] keeps one file per key in a state directory and replaces it
//! atomically (temp file in the same directory, then rename), so a crash in
//! the middle of a write leaves the previous value intact.

use crate::error::StoreError;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Key holding the serialized history sequence.
pub const HISTORY_KEY: &str = "conversion-history";
/// Key holding the theme preference.
pub const THEME_KEY: &str = "theme";

/// Synchronous byte store addressed by string keys.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key under a state directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            key: dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        key: key.to_string(),
        source,
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err(key))?;
        tmp.write_all(value).map_err(io_err(key))?;
        tmp.as_file().sync_all().map_err(io_err(key))?;
        tmp.persist(self.path_for(key))
            .map_err(|e| io_err(key)(e.error))?;
        debug!("Stored {} bytes under '{}'", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key)(e)),
        }
    }
}

/// In-process store. Used by tests and by callers that do not want history
/// to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).unwrap();

        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
        store.put(HISTORY_KEY, b"[]").unwrap();
        assert_eq!(store.get(HISTORY_KEY).unwrap(), Some(b"[]".to_vec()));

        store.put(HISTORY_KEY, b"[1]").unwrap();
        assert_eq!(store.get(HISTORY_KEY).unwrap(), Some(b"[1]".to_vec()));

        store.remove(HISTORY_KEY).unwrap();
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
        // Removing a missing key is not an error.
        store.remove(HISTORY_KEY).unwrap();
    }

    #[test]
    fn file_store_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put(HISTORY_KEY, b"[]").unwrap();
        store.put(THEME_KEY, b"light").unwrap();
        assert_eq!(store.get(THEME_KEY).unwrap(), Some(b"light".to_vec()));
        assert_eq!(store.get(HISTORY_KEY).unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.put(THEME_KEY, b"dark").unwrap();
        assert_eq!(store.get(THEME_KEY).unwrap(), Some(b"dark".to_vec()));
        store.remove(THEME_KEY).unwrap();
        assert_eq!(store.get(THEME_KEY).unwrap(), None);
    }
}
