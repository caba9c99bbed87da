mod atomic_io;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

pub(crate) use atomic_io::write_text_atomic;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read tile file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write tile file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tile name '{name}' is not a valid file name")]
    InvalidName { name: String },
}

/// Byte-level persistence of tile files, keyed by tile name.
pub trait TileStore: Send + Sync {
    /// `Ok(None)` when no file exists under `name`.
    fn read(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, name: &str, text: &str) -> Result<(), StorageError>;
}

/// One file per tile under a directory.
#[derive(Debug, Clone)]
pub struct FsTileStore {
    dir: PathBuf,
}

impl FsTileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let is_plain_file_name = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(|c: char| c == '/' || c == '\\');
        if !is_plain_file_name {
            return Err(StorageError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(name))
    }
}

impl TileStore for FsTileStore {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    fn write(&self, name: &str, text: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        write_text_atomic(&path, text).map_err(|source| StorageError::Write { path, source })
    }
}

/// In-process store for tests and throwaway worlds.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, text: impl Into<String>) {
        self.lock().insert(name.into(), text.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TileStore for MemoryTileStore {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(name))
    }

    fn write(&self, name: &str, text: &str) -> Result<(), StorageError> {
        self.insert(name, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn fs_store_reports_missing_file_as_none() {
        let temp = TempDir::new().expect("temp");
        let store = FsTileStore::new(temp.path().join("tiles"));
        assert!(store.read("tile_0_0.txt").expect("read").is_none());
    }

    #[test]
    fn fs_store_round_trips_text() {
        let temp = TempDir::new().expect("temp");
        let store = FsTileStore::new(temp.path().join("tiles"));
        store
            .write("tile_1_-1.txt", "<TF>1.0</TF>\n")
            .expect("write");
        assert_eq!(
            store.read("tile_1_-1.txt").expect("read").as_deref(),
            Some("<TF>1.0</TF>\n")
        );
        assert!(store.dir().join("tile_1_-1.txt").is_file());
    }

    #[test]
    fn fs_store_rejects_path_like_names() {
        let temp = TempDir::new().expect("temp");
        let store = FsTileStore::new(temp.path());
        for name in ["", "..", "../escape.txt", "a/b.txt"] {
            let err = store.write(name, "x").expect_err("invalid name");
            assert!(matches!(err, StorageError::InvalidName { .. }), "{name}");
        }
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryTileStore::new();
        store.write("a.txt", "1").expect("write");
        store.write("a.txt", "2").expect("write");
        assert_eq!(store.read("a.txt").expect("read").as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
    }
}
