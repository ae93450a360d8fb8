// SPDX-License-Identifier: Apache-2.0

//! Source definitions and tailing configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::parser::Cast;

/// A source as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    /// Glob pattern; re-scanned periodically for new matches
    pub glob: Option<String>,
    /// Single file path; does not need to exist yet
    pub path: Option<String>,
    /// Regular expression with named capture groups
    pub pattern: String,
    /// Event type label sent to Cube
    #[serde(rename = "type")]
    pub event_type: String,
    /// Capture group name -> cast name
    pub cast: HashMap<String, String>,
}

/// What a source watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    Glob(String),
    Path(PathBuf),
}

/// A named capture group and the cast resolved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub cast: Option<Cast>,
}

/// A compiled source. Immutable once built; shared by every tailer the source
/// fans out to.
#[derive(Debug, Clone)]
pub struct Source {
    target: SourceTarget,
    regex: Regex,
    event_type: String,
    fields: Vec<Field>,
}

impl Source {
    /// Compile a source from its configuration, resolving every cast name.
    pub fn compile(config: &SourceConfig) -> Result<Self> {
        let target = match (&config.glob, &config.path) {
            (Some(glob), path) if !glob.is_empty() => {
                if path.as_deref().is_some_and(|p| !p.is_empty()) {
                    warn!(glob = %glob, "Source has both glob and path, using glob");
                }
                glob::Pattern::new(glob)
                    .map_err(|e| Error::InvalidGlob(format!("{}: {}", glob, e)))?;
                SourceTarget::Glob(glob.clone())
            }
            (_, Some(path)) if !path.is_empty() => SourceTarget::Path(PathBuf::from(path)),
            _ => {
                return Err(Error::Config(
                    "source must specify a glob or a path".to_string(),
                ));
            }
        };

        if config.event_type.is_empty() {
            return Err(Error::Config("source must specify a type".to_string()));
        }

        let regex = Regex::new(&config.pattern)
            .map_err(|e| Error::Regex(format!("invalid pattern {:?}: {}", config.pattern, e)))?;

        let fields: Vec<Field> = regex
            .capture_names()
            .flatten()
            .filter(|name| !name.is_empty())
            .map(|name| {
                let cast = match config.cast.get(name) {
                    None => None,
                    Some(cast_name) => Some(cast_name.parse::<Cast>().map_err(|_| {
                        Error::UnknownCast {
                            field: name.to_string(),
                            name: cast_name.clone(),
                        }
                    })?),
                };
                Ok(Field {
                    name: name.to_string(),
                    cast,
                })
            })
            .collect::<Result<_>>()?;

        for (field, cast_name) in &config.cast {
            if !fields.iter().any(|f| &f.name == field) {
                // Still reject unknown names so typos surface at load time
                cast_name.parse::<Cast>().map_err(|_| Error::UnknownCast {
                    field: field.clone(),
                    name: cast_name.clone(),
                })?;
                warn!(
                    field = %field,
                    pattern = %config.pattern,
                    "Cast configured for a field the pattern does not capture"
                );
            }
        }

        Ok(Self {
            target,
            regex,
            event_type: config.event_type.clone(),
            fields,
        })
    }

    pub fn target(&self) -> &SourceTarget {
        &self.target
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Named capture groups in pattern order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// How a tailer reacts to a stretch of time with no new lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationMode {
    /// Reset the checkpoint only when the file is shorter than the offset.
    #[default]
    Size,
    /// Reset a nonzero checkpoint to 0 after every idle gap, without moving
    /// the live read position. Matches the historical log-to-cube behavior.
    Legacy,
}

/// Settings shared by every tailer.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// How often the file is polled for new lines
    pub poll_interval: Duration,
    /// How often a dirty offset is flushed to the checkpoint store
    pub flush_interval: Duration,
    /// Idle time after which gap handling runs
    pub gap_interval: Duration,
    pub truncation_mode: TruncationMode,
    /// Lines longer than this are truncated
    pub max_line_bytes: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            flush_interval: Duration::from_millis(500),
            gap_interval: Duration::from_secs(1),
            truncation_mode: TruncationMode::Size,
            max_line_bytes: 1024 * 1024,
        }
    }
}

impl TailerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll interval must be positive".to_string());
        }
        if self.flush_interval.is_zero() {
            return Err("flush interval must be positive".to_string());
        }
        if self.max_line_bytes == 0 {
            return Err("max line bytes must be positive".to_string());
        }
        Ok(())
    }
}
