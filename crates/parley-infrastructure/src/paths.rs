//! Unified path management for parley files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/parley/                 # Config directory
//! └── config.toml                   # [history] settings
//!
//! ~/.local/share/parley/            # Data directory
//! └── history/
//!     └── <workspace>/
//!         └── <project>/            # One partition store per project
//! ```

use parley_core::error::{ParleyError, Result};
use parley_core::history::naming::message_key;
use std::path::PathBuf;

const APP_DIR: &str = "parley";

/// Resolves parley's config and data locations.
///
/// With a base directory every path lives under it (tests, portable
/// installs); otherwise the platform config/data directories are used.
#[derive(Debug, Clone, Default)]
pub struct ParleyPaths {
    base: Option<PathBuf>,
}

impl ParleyPaths {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.base {
            Some(base) => Ok(base.join("config")),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| ParleyError::config("Cannot determine config directory")),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.base {
            Some(base) => Ok(base.join("data")),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| ParleyError::config("Cannot determine data directory")),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    pub fn history_root(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("history"))
    }

    /// Store root of one (workspace, project) pair. Names are sanitized the
    /// same way record keys are.
    pub fn project_history_dir(&self, workspace: &str, project: &str) -> Result<PathBuf> {
        Ok(self
            .history_root()?
            .join(dir_key(workspace))
            .join(dir_key(project)))
    }
}

fn dir_key(name: &str) -> String {
    let key = message_key(name);
    if key.chars().all(|c| c == '.') {
        key.replace('.', "-")
    } else {
        key
    }
}
