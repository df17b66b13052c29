//! Platform-specific configuration and state paths

use crate::error::{CliError, CliResult};
use std::path::{Path, PathBuf};

/// Where the CLI keeps its configuration and local state
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Base configuration directory
    pub config_dir: PathBuf,
    /// Path to config.json
    pub config_file: PathBuf,
    /// Directory holding the checkpoint and audit log files
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    /// Get paths for the current platform
    ///
    /// Paths:
    /// - Linux: ~/.config/bulkops/
    /// - macOS: ~/Library/Application Support/bulkops/
    /// - Windows: %APPDATA%\bulkops\
    pub fn new() -> CliResult<Self> {
        Ok(Self::in_dir(Self::get_config_dir()?))
    }

    pub fn in_dir(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        Self {
            config_file: config_dir.join("config.json"),
            state_dir: config_dir.join("state"),
            config_dir,
        }
    }

    /// Get the configuration directory, respecting BULKOPS_CONFIG_DIR
    fn get_config_dir() -> CliResult<PathBuf> {
        if let Ok(dir) = std::env::var("BULKOPS_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }

        let base_dir = dirs::config_dir().ok_or_else(|| {
            CliError::Config("Could not determine configuration directory".to_string())
        })?;

        Ok(base_dir.join("bulkops"))
    }

    /// Ensure the state directory exists
    pub fn ensure_dirs_exist(&self) -> CliResult<()> {
        if !self.state_dir.exists() {
            std::fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}
