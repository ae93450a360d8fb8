// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown cast {name:?} for field {field:?}")]
    UnknownCast { field: String, name: String },

    #[error("Checkpoint read failed for {path:?}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Regex error: {0}")]
    Regex(String),
}

pub type Result<T> = std::result::Result<T, Error>;
