//! Storage abstraction for the FxA sample client.
//!
//! The flow core only needs get/set of an opaque string blob. Two backends
//! ship here:
//! - **MemoryStorage**: process-local, for tests and throwaway sessions
//! - **FileStorage**: a single owner-only JSON file under the sample's base dir

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed storage at `path`.
pub fn create_storage(path: impl Into<PathBuf>) -> Box<dyn SecureStorage> {
    Box::new(FileStorage::new(path))
}
