//! JSON file-based checkpoint store with atomic writes.
//!
//! The database is a single JSON object mapping absolute file paths to their
//! [`SeekState`]. Writes are atomic using a write-to-temp-then-rename strategy.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::{CheckpointStore, SeekState, checkpoint_key};
use crate::receivers::file::error::{Error, Result};

type DatabaseState = BTreeMap<String, SeekState>;

/// Checkpoint store backed by a JSON file.
///
/// The file is opened and closed on every call. An in-process lock serializes
/// the read-modify-write of `put` so that tailers writing different keys do
/// not overwrite each other.
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> Result<DatabaseState> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DatabaseState::new()),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "failed to open database {:?}: {}",
                    self.path, e
                )));
            }
        };

        // An empty file is a freshly created database
        if file.metadata().map(|m| m.len() == 0).unwrap_or(false) {
            return Ok(DatabaseState::new());
        }

        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::Persistence(format!("failed to parse database {:?}: {}", self.path, e))
        })
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn get(&self, path: &Path) -> Result<SeekState> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let state = self.read_state()?;
        let key = checkpoint_key(path);
        Ok(state
            .get(key.to_string_lossy().as_ref())
            .copied()
            .unwrap_or_default())
    }

    fn put(&self, path: &Path, seek: &SeekState) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let mut state = self.read_state()?;
        let key = checkpoint_key(path);
        state.insert(key.to_string_lossy().into_owned(), *seek);

        atomic_write(&self.path, &state)
    }
}

/// Write state to file atomically (write to temp, then rename)
fn atomic_write(path: &Path, state: &DatabaseState) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    // Unique temp name per process and write
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    if let Err(e) = write_synced(&temp_path, state) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Persistence(format!(
            "failed to rename database file: {}",
            e
        )));
    }

    Ok(())
}

/// Write the state and sync it to disk so a rename never exposes a partial
/// file.
fn write_synced(temp_path: &Path, state: &DatabaseState) -> Result<()> {
    let file = File::create(temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)
        .map_err(|e| Error::Persistence(format!("failed to write database: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush database: {}", e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| Error::Persistence(format!("failed to sync database: {}", e)))?;
    Ok(())
}
