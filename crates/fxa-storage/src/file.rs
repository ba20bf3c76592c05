//! File-backed storage.
//!
//! All keys live in a single JSON object on disk. Every write rewrites the
//! whole file through a temporary sibling and a rename, and on unix the file
//! is created with mode 0600. A file that no longer parses is treated as
//! empty and replaced on the next write.

use crate::{SecureStorage, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Storage backed by a JSON file.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a storage rooted at `path`. The file is created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Storage file is not a JSON object, treating it as empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        write_private(&tmp_path, content.as_bytes())?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), keys = data.len(), "Storage file written");
        Ok(())
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> StorageResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Platform("file storage lock poisoned".to_string()))?;

        let mut data = self.read_all()?;
        let result = f(&mut data);
        self.write_all(&data)?;
        Ok(result)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.modify(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.modify(|data| data.remove(key).is_some())
    }
}
