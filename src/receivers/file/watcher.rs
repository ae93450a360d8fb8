// SPDX-License-Identifier: Apache-2.0

//! Source supervision.
//!
//! The [`SourceWatcher`] expands every source to concrete files and starts one
//! [`Tailer`] per file. Globs are re-scanned on an interval so files created
//! later are picked up. A path is tailed at most once for the lifetime of the
//! watcher, even when several sources match it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::receivers::file::config::{Source, TailerConfig};
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::input::FileFinder;
use crate::receivers::file::parser::Extractor;
use crate::receivers::file::persistence::{CheckpointStore, checkpoint_key};
use crate::receivers::file::tailer::Tailer;
use crate::topology::event_buffer::EventBuffer;

pub struct SourceWatcher {
    sources: Vec<Arc<Source>>,
    store: Arc<dyn CheckpointStore>,
    buffer: EventBuffer,
    tailer_config: TailerConfig,
    rescan_interval: Duration,
    /// Absolute paths that already have a tailer
    watching: HashSet<PathBuf>,
    tailers: JoinSet<Result<()>>,
    /// Path followed by each running tailer task
    tasks: HashMap<task::Id, PathBuf>,
    cancel: CancellationToken,
}

impl SourceWatcher {
    pub fn new(
        sources: Vec<Arc<Source>>,
        store: Arc<dyn CheckpointStore>,
        buffer: EventBuffer,
        tailer_config: TailerConfig,
        rescan_interval: Duration,
    ) -> Self {
        Self {
            sources,
            store,
            buffer,
            tailer_config,
            rescan_interval,
            watching: HashSet::new(),
            tailers: JoinSet::new(),
            tasks: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Paths currently being tailed
    pub fn watching(&self) -> impl Iterator<Item = &Path> {
        self.watching.iter().map(PathBuf::as_path)
    }

    pub fn watched_count(&self) -> usize {
        self.watching.len()
    }

    /// Resolve every source and start its tailers. A checkpoint that cannot be
    /// read is fatal here since there is no safe place to resume from.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<usize> {
        self.cancel = cancel.child_token();
        let started = self.scan(true).await?;
        info!(
            sources = self.sources.len(),
            files = started,
            "Source watcher started"
        );
        Ok(started)
    }

    /// Look for files that are not yet tailed. Returns how many tailers were
    /// started.
    pub async fn scan(&mut self, fatal: bool) -> Result<usize> {
        let mut started = 0;

        for source in self.sources.clone() {
            let finder = FileFinder::new(source.target().clone());
            let paths = match finder.find_files() {
                Ok(paths) => paths,
                Err(e) if fatal => return Err(e),
                Err(e) => {
                    warn!(target = ?source.target(), error = %e, "Failed to resolve source");
                    continue;
                }
            };

            for path in paths {
                let key = checkpoint_key(&path);
                if self.watching.contains(&key) {
                    continue;
                }

                let store = self.store.clone();
                let lookup = key.clone();
                let initial = tokio::task::spawn_blocking(move || store.get(&lookup))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))
                    .and_then(|r| r);

                let initial = match initial {
                    Ok(state) => state,
                    Err(e) if fatal => {
                        return Err(Error::Checkpoint {
                            path: key,
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        // Retried on the next scan
                        error!(path = ?key, error = %e, "Failed to read checkpoint, skipping file");
                        continue;
                    }
                };

                let extractor = Extractor::new(source.clone(), self.buffer.clone());
                let tailer = Tailer::new(
                    key.clone(),
                    initial,
                    extractor,
                    self.store.clone(),
                    self.tailer_config.clone(),
                );

                let cancel = self.cancel.clone();
                let handle = self.tailers.spawn(tailer.run(cancel));
                self.tasks.insert(handle.id(), key.clone());
                self.watching.insert(key);
                started += 1;
            }
        }

        if started > 0 {
            debug!(started, watching = self.watching.len(), "Started tailers");
        }
        Ok(started)
    }

    /// Re-scan every source until cancelled, then wait for every tailer to
    /// flush and stop. Tailers must have been started with a token that is
    /// cancelled no later than `cancel`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut rescan = tokio::time::interval(self.rescan_interval);
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Source watcher cancelled");
                    break;
                }

                Some(joined) = self.tailers.join_next_with_id(), if !self.tailers.is_empty() => {
                    self.reap(joined);
                }

                _ = rescan.tick() => {
                    if let Err(e) = self.scan(false).await {
                        warn!(error = %e, "Rescan failed");
                    }
                }
            }
        }

        self.cancel.cancel();
        let files = self.watching.len();
        while let Some(joined) = self.tailers.join_next_with_id().await {
            self.reap(joined);
        }

        info!(files, "Source watcher stopped");
        Ok(())
    }

    /// Handle a finished tailer task. A tailer that failed or panicked has
    /// its path forgotten so the next scan restarts it.
    fn reap(&mut self, joined: std::result::Result<(task::Id, Result<()>), JoinError>) {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
            Err(e) => (e.id(), Err(e.to_string())),
        };
        let Some(path) = self.tasks.remove(&id) else {
            return;
        };

        match result {
            Ok(()) => debug!(path = ?path, "Tailer exited"),
            Err(e) => {
                error!(path = ?path, error = %e, "Tailer failed");
                self.watching.remove(&path);
            }
        }
    }
}
