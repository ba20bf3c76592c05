//! In-memory storage backend.
//!
//! Nothing survives the process; used for tests and `--ephemeral` runs.

use crate::{SecureStorage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Platform("memory storage lock poisoned".to_string()))
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}
