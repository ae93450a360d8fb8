use glob::glob;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::receivers::file::config::SourceTarget;
use crate::receivers::file::error::{Error, Result};

/// Resolves a source target to the concrete files it currently names.
#[derive(Debug, Clone)]
pub struct FileFinder {
    target: SourceTarget,
}

impl FileFinder {
    pub fn new(target: SourceTarget) -> Self {
        Self { target }
    }

    /// Find the files for this target.
    ///
    /// A glob yields its current matches, skipping directories and unreadable
    /// entries. A path is returned as-is whether or not it exists yet; the
    /// tailer waits for it to appear.
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        match &self.target {
            SourceTarget::Path(path) => Ok(vec![path.clone()]),
            SourceTarget::Glob(pattern) => {
                let matches = glob(pattern).map_err(|e| Error::InvalidGlob(e.to_string()))?;

                let mut seen = HashSet::new();
                let mut paths = Vec::new();
                // Unreadable directories are skipped, not fatal
                for path in matches.flatten() {
                    if path.is_dir() {
                        continue;
                    }
                    if seen.insert(path.clone()) {
                        paths.push(path);
                    }
                }
                Ok(paths)
            }
        }
    }
}
