// SPDX-License-Identifier: Apache-2.0

//! File receiver for tailing log files.
//!
//! Sources name files by glob or path. Every matching file gets a tailer that
//! reads appended lines, turns matching lines into events with a regular
//! expression and records its progress in a checkpoint store so a restart
//! resumes where it left off.

pub mod config;
pub mod error;
pub mod input;
pub mod parser;
pub mod persistence;
pub mod tailer;
pub mod watcher;

pub use config::{Source, SourceConfig, SourceTarget, TailerConfig, TruncationMode};
pub use error::{Error, Result};
pub use input::{FileFinder, FileFollower};
pub use parser::{Cast, Extractor};
pub use persistence::{CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore, SeekState};
pub use tailer::Tailer;
pub use watcher::SourceWatcher;
