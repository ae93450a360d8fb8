// SPDX-License-Identifier: Apache-2.0

//! Durable storage of per-file resume offsets.
//!
//! Uses JSON file storage with atomic writes. Every call opens, uses and
//! releases the database file; nothing is held open between calls.

mod json_file;
mod memory;
mod store;

pub use json_file::JsonFileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use store::{CheckpointStore, SeekState, checkpoint_key};
