// SPDX-License-Identifier: Apache-2.0

//! Per-file tailing task.
//!
//! A tailer owns one file's [`SeekState`]. It polls a [`FileFollower`] for new
//! lines, hands each line to its [`Extractor`], advances the in-memory offset
//! and periodically flushes a dirty offset to the checkpoint store. File I/O
//! runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::select;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::receivers::file::config::{TailerConfig, TruncationMode};
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::input::{FileFollower, FollowBatch};
use crate::receivers::file::parser::Extractor;
use crate::receivers::file::persistence::{CheckpointStore, SeekState};

pub struct Tailer {
    path: PathBuf,
    follower: Option<FileFollower>,
    extractor: Extractor,
    store: Arc<dyn CheckpointStore>,
    config: TailerConfig,
    seek: SeekState,
    dirty: bool,
    last_line_at: Instant,
    /// Lines that did not match the source pattern
    unmatched: u64,
}

impl Tailer {
    pub fn new(
        path: PathBuf,
        initial: SeekState,
        extractor: Extractor,
        store: Arc<dyn CheckpointStore>,
        config: TailerConfig,
    ) -> Self {
        // A negative stored offset starts over and is written back
        let start = u64::try_from(initial.offset).unwrap_or(0);
        let clamped = initial.offset < 0;
        if clamped {
            warn!(path = ?path, offset = initial.offset, "Negative checkpoint offset, starting from 0");
        }
        let follower = FileFollower::new(&path, start, config.max_line_bytes);

        Self {
            path,
            follower: Some(follower),
            extractor,
            store,
            config,
            seek: SeekState::new(start as i64),
            dirty: clamped,
            last_line_at: Instant::now(),
            unmatched: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory offset
    pub fn seek_state(&self) -> SeekState {
        self.seek
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Run until cancelled, then flush a final time.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(path = ?self.path, offset = self.seek.offset, "Watching path");

        let mut poll_interval = tokio::time::interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush_interval = tokio::time::interval(self.config.flush_interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(path = ?self.path, "Tailer cancelled");
                    break;
                }

                _ = flush_interval.tick() => {
                    self.flush().await;
                }

                _ = poll_interval.tick() => {
                    self.poll_once().await?;
                }
            }
        }

        self.flush().await;
        debug!(path = ?self.path, offset = self.seek.offset, "Tailer stopped");
        Ok(())
    }

    /// Poll the file once, extract its lines and apply gap handling.
    pub async fn poll_once(&mut self) -> Result<()> {
        let mut follower = match self.follower.take() {
            Some(f) => f,
            None => return Ok(()),
        };

        let (follower, polled) = tokio::task::spawn_blocking(move || {
            let polled = follower.poll();
            (follower, polled)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.follower = Some(follower);

        match polled {
            Ok(batch) => self.handle_batch(batch),
            Err(e) => {
                // Dropping the handle makes the next poll reopen the path
                warn!(path = ?self.path, error = %e, "Failed to read file, will reopen");
                if let Some(follower) = self.follower.as_ref() {
                    let position = follower.position();
                    self.follower = Some(FileFollower::new(
                        &self.path,
                        position,
                        self.config.max_line_bytes,
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle_batch(&mut self, batch: FollowBatch) {
        if !batch.lines.is_empty() {
            self.last_line_at = Instant::now();
        }

        for line in &batch.lines {
            self.seek.offset += line.bytes as i64;
            self.dirty = true;
            if !self.extractor.consume(&line.text) {
                self.unmatched += 1;
            }
        }

        if batch.reopened {
            info!(path = ?self.path, "File was rotated, following the new file");
            self.sync_offset_to_follower();
        }

        if batch.truncated {
            warn!(
                path = ?self.path,
                offset = self.seek.offset,
                file_len = ?batch.file_len,
                "File truncated, restarting from the beginning"
            );
            if let Some(follower) = self.follower.as_mut() {
                if let Err(e) = follower.rewind() {
                    warn!(path = ?self.path, error = %e, "Failed to rewind file");
                }
            }
            self.sync_offset_to_follower();
        }

        if batch.lines.is_empty() && self.last_line_at.elapsed() >= self.config.gap_interval {
            self.handle_gap();
            self.last_line_at = Instant::now();
        }
    }

    fn sync_offset_to_follower(&mut self) {
        if let Some(follower) = self.follower.as_ref() {
            self.seek.offset = follower.position() as i64;
            self.dirty = true;
        }
    }

    /// Called after `gap_interval` without new lines.
    fn handle_gap(&mut self) {
        match self.config.truncation_mode {
            // Truncation is detected on every poll from the file size
            TruncationMode::Size => {}
            TruncationMode::Legacy => {
                if self.seek.offset != 0 {
                    warn!(
                        path = ?self.path,
                        offset = self.seek.offset,
                        "No new lines, resetting checkpoint offset to 0 (legacy truncation mode)"
                    );
                    self.seek.offset = 0;
                    self.dirty = true;
                }
            }
        }
    }

    /// Persist the offset if it changed since the last flush. A failed write
    /// leaves the offset dirty so the next flush retries it.
    pub async fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let store = self.store.clone();
        let path = self.path.clone();
        let seek = self.seek;
        let result = tokio::task::spawn_blocking(move || store.put(&path, &seek)).await;

        match result {
            Ok(Ok(())) => {
                debug!(path = ?self.path, offset = seek.offset, "Flushed checkpoint");
            }
            Ok(Err(e)) => {
                warn!(path = ?self.path, offset = seek.offset, error = %e, "Failed to flush checkpoint");
                self.dirty = true;
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Checkpoint flush task failed");
                self.dirty = true;
            }
        }

        if self.unmatched > 0 {
            debug!(path = ?self.path, count = self.unmatched, "Dropped unmatched lines");
            self.unmatched = 0;
        }
    }
}
