//! Storage layer for atomic file operations and the record file format.

mod atomic_toml;
pub mod record_format;

pub use atomic_toml::AtomicTomlFile;
pub(crate) use atomic_toml::{FileLock, temp_path_for};

use parley_core::error::{ParleyError, Result};

/// Runs blocking file work (locks, small synchronous writes) off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ParleyError::internal(format!("Blocking task failed: {}", e)))?
}
