//! Atomic TOML file operations.
//!
//! Small state files (the sequence counter, the config file) are replaced via
//! a temp file + fsync + rename, so readers never observe a half-written file.

use parley_core::error::{ParleyError, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A handle to a TOML file that is always replaced atomically.
///
/// Provides:
/// - **Atomicity**: Updates are all-or-nothing via tmp file + atomic rename
/// - **Isolation**: `update` holds an exclusive lock file for the read-modify-write
/// - **Durability**: Explicit fsync before rename
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let data: T = toml::from_str(&content)?;
        Ok(Some(data))
    }

    /// Saves data atomically. Failures are reported as persistence errors for
    /// this file's path.
    pub fn save(&self, data: &T) -> Result<()> {
        self.write_atomically(data)
            .map_err(|e| e.into_persistence(&self.path))
    }

    fn write_atomically(&self, data: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let tmp_path = temp_path_for(&self.path)?;
        let written = (|| -> std::io::Result<()> {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(toml_string.as_bytes())?;
            tmp_file.sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Read-modify-write under an exclusive lock file.
    pub fn update<F>(&self, default_value: T, f: F) -> Result<T>
    where
        F: FnOnce(&mut T),
        T: Clone,
    {
        let _lock = FileLock::acquire(&self.path.with_extension("lock"))?;

        let mut data = self.load()?.unwrap_or(default_value);
        f(&mut data);
        self.save(&data)?;

        Ok(data)
    }
}

/// `.<name>.tmp` next to `path`.
pub(crate) fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| ParleyError::io(format!("{} has no parent directory", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| ParleyError::io(format!("{} has no file name", path.display())))?;

    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// An exclusive advisory lock held for the guard's lifetime.
///
/// The lock file itself is left in place: removing it while another process
/// waits on the same path would let two holders in.
pub(crate) struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Blocks until the lock on `lock_path` is acquired.
    pub(crate) fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive().map_err(|e| {
                ParleyError::persistence(lock_path, format!("Failed to acquire lock: {}", e))
            })?;
        }

        Ok(FileLock { file })
    }
}
