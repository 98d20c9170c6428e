//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` and caches it.

use crate::paths::ParleyPaths;
use crate::storage::AtomicTomlFile;
use parley_core::config::RootConfig;
use parley_core::error::Result;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Loads and caches the root configuration.
///
/// A missing file yields defaults; an unreadable file is logged and also
/// yields defaults, so a bad config never prevents history from loading.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<RootConfig>>>,
}

impl ConfigService {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Service over the default `config.toml` location.
    pub fn from_paths(paths: &ParleyPaths) -> Result<Self> {
        Ok(Self::new(paths.config_file()?))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Gets the root configuration, loading from file if not cached.
    pub fn get_config(&self) -> RootConfig {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = cached.as_ref() {
                return config.clone();
            }
        }

        let loaded = match AtomicTomlFile::<RootConfig>::new(self.path.clone()).load() {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    "[ConfigService] Failed to load {}, using defaults: {}",
                    self.path.display(),
                    e
                );
                RootConfig::default()
            }
        };

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded.clone());
        loaded
    }

    /// Writes `config` to disk and replaces the cached copy.
    pub fn save_config(&self, config: &RootConfig) -> Result<()> {
        AtomicTomlFile::<RootConfig>::new(self.path.clone()).save(config)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("config.toml"));
        assert_eq!(service.get_config(), RootConfig::default());
    }

    #[test]
    fn test_reads_history_table_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[history]\nbatch_interval_ms = 40\n").unwrap();

        let service = ConfigService::new(path.clone());
        assert_eq!(service.get_config().history.batch_interval_ms, 40);

        std::fs::write(&path, "[history]\nbatch_interval_ms = 80\n").unwrap();
        assert_eq!(service.get_config().history.batch_interval_ms, 40);

        service.invalidate_cache();
        assert_eq!(service.get_config().history.batch_interval_ms, 80);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[history\n").unwrap();

        let service = ConfigService::new(path);
        assert_eq!(service.get_config(), RootConfig::default());
    }

    #[test]
    fn test_save_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("config.toml"));
        let mut config = RootConfig::default();
        config.history.latest_lookback_days = 3;

        service.save_config(&config).unwrap();
        service.invalidate_cache();
        assert_eq!(service.get_config().history.latest_lookback_days, 3);
    }
}
