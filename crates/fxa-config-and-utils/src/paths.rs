//! File system paths for the sample client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".fxa-sample";

/// Manages file system paths for the sample client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.fxa-sample)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.fxa-sample`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.fxa-sample).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.fxa-sample/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the account state store path (~/.fxa-sample/state.json).
    pub fn state_file(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    /// Get the logs directory (~/.fxa-sample/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
