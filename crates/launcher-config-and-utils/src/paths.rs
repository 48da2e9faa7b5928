//! File system paths for the host.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the host.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for host files (~/.oplauncher)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.oplauncher`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".oplauncher"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.oplauncher).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.oplauncher/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.oplauncher/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the host log file path (~/.oplauncher/logs/host.jsonl).
    pub fn host_log_file(&self) -> PathBuf {
        self.logs_dir().join("host.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
