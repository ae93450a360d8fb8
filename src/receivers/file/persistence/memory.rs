// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::store::{CheckpointStore, SeekState, checkpoint_key};
use crate::receivers::file::error::{Error, Result};

/// In-memory checkpoint store, useful for testing.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<PathBuf, SeekState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths with a stored state
    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, path: &Path) -> Result<SeekState> {
        let states = self
            .states
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(states
            .get(&checkpoint_key(path))
            .copied()
            .unwrap_or_default())
    }

    fn put(&self, path: &Path, state: &SeekState) -> Result<()> {
        let mut states = self
            .states
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        states.insert(checkpoint_key(path), *state);
        Ok(())
    }
}
