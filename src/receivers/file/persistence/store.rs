// SPDX-License-Identifier: Apache-2.0

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::receivers::file::error::Result;

/// Resume position for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekState {
    /// Bytes consumed from the start of the file
    pub offset: i64,
}

impl SeekState {
    pub fn new(offset: i64) -> Self {
        Self { offset }
    }
}

/// Durable mapping from file path to its last flushed [`SeekState`].
///
/// Implementations must tolerate concurrent use from many tailers, each
/// owning a different key.
pub trait CheckpointStore: Send + Sync + 'static {
    /// Read the state for a path. A path with no record starts at offset 0.
    fn get(&self, path: &Path) -> Result<SeekState>;

    /// Persist the state for a path.
    fn put(&self, path: &Path, state: &SeekState) -> Result<()>;
}

/// Key under which a path's state is stored: the absolute path with `.` and
/// `..` folded away, without resolving symlinks. The file does not need to
/// exist.
pub fn checkpoint_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root is a no-op
                key.pop();
            }
            c => key.push(c),
        }
    }
    key
}
