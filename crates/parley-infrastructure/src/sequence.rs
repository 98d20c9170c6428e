//! Persistent global sequence number (GSN) state.

use crate::storage::{AtomicTomlFile, run_blocking};
use parley_core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SEQUENCE_FILE_NAME: &str = "sequence.toml";

/// Contents of `sequence.toml`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub last_gsn: u64,
}

/// Reads and writes the last issued GSN of one store.
#[derive(Debug, Clone)]
pub struct SequenceFile {
    path: PathBuf,
}

impl SequenceFile {
    pub fn in_dir(root: &Path) -> Self {
        Self {
            path: root.join(SEQUENCE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<u64> {
        let path = self.path.clone();
        let state = run_blocking(move || AtomicTomlFile::<SequenceState>::new(path).load()).await?;
        Ok(state.unwrap_or_default().last_gsn)
    }

    /// Persists `gsn` unless the file already holds a higher value.
    pub async fn store(&self, gsn: u64) -> Result<()> {
        let path = self.path.clone();
        run_blocking(move || {
            AtomicTomlFile::<SequenceState>::new(path).update(SequenceState::default(), |state| {
                state.last_gsn = state.last_gsn.max(gsn);
            })
        })
        .await?;
        Ok(())
    }
}
