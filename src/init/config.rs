// SPDX-License-Identifier: Apache-2.0

//! The JSON configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::receivers::file::{Source, SourceConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid cube endpoint {endpoint:?}: {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("invalid source at index {index}: {source}")]
    Invalid {
        index: usize,
        source: crate::receivers::file::Error,
    },
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Cube collector
    pub cube: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Check the endpoint and compile every source.
    pub fn compile(&self) -> Result<Vec<Arc<Source>>, ConfigError> {
        self.validate_endpoint()?;

        self.sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                Source::compile(source)
                    .map(Arc::new)
                    .map_err(|source| ConfigError::Invalid { index, source })
            })
            .collect()
    }

    fn validate_endpoint(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Endpoint {
            endpoint: self.cube.clone(),
            reason,
        };

        let url = Url::parse(&self.cube).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {:?}", other))),
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        Ok(())
    }
}
