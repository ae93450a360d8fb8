// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use clap::{Args, ValueEnum};
use tower::BoxError;

use crate::exporters::cube::UploaderConfig;
use crate::receivers::file::{TailerConfig, TruncationMode};

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Path to the JSON configuration file
    #[arg(long, env = "LOG_TO_CUBE_CONFIG", default_value = "config.json")]
    pub config: String,

    /// Path to the checkpoint database
    #[arg(long, env = "LOG_TO_CUBE_CHECKPOINT_DB", default_value = "data.db")]
    pub checkpoint_db: String,

    /// Maximum events per request
    #[arg(long, env = "LOG_TO_CUBE_BATCH_SIZE", default_value = "500")]
    pub batch_size: usize,

    /// Maximum requests in flight during an upload round
    #[arg(long, env = "LOG_TO_CUBE_MAX_CONCURRENT_UPLOADS", default_value = "5")]
    pub max_concurrent_uploads: usize,

    /// Time between upload rounds
    #[arg(
        long,
        env = "LOG_TO_CUBE_UPLOAD_INTERVAL",
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub upload_interval: Duration,

    /// Timeout for a single request to the collector
    #[arg(
        long,
        env = "LOG_TO_CUBE_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration,
    )]
    pub request_timeout: Duration,

    /// Time between glob re-scans for new files
    #[arg(
        long,
        env = "LOG_TO_CUBE_RESCAN_INTERVAL",
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub rescan_interval: Duration,

    /// Time between polls of each tailed file
    #[arg(
        long,
        env = "LOG_TO_CUBE_POLL_INTERVAL",
        default_value = "250ms",
        value_parser = humantime::parse_duration,
    )]
    pub poll_interval: Duration,

    /// How an idle file's checkpoint is treated
    #[arg(
        value_enum,
        long,
        env = "LOG_TO_CUBE_TRUNCATION_MODE",
        default_value = "size"
    )]
    pub truncation_mode: TruncationModeArg,

    /// Lines longer than this many bytes are truncated
    #[arg(long, env = "LOG_TO_CUBE_MAX_LINE_BYTES", default_value = "1048576")]
    pub max_line_bytes: usize,
}

impl Default for AgentRun {
    fn default() -> Self {
        Self {
            config: "config.json".to_string(),
            checkpoint_db: "data.db".to_string(),
            batch_size: 500,
            max_concurrent_uploads: 5,
            upload_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            rescan_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            truncation_mode: TruncationModeArg::Size,
            max_line_bytes: 1024 * 1024,
        }
    }
}

impl AgentRun {
    pub fn validate(&self) -> Result<(), BoxError> {
        if self.batch_size == 0 {
            return Err("batch size must be at least 1".into());
        }
        if self.max_concurrent_uploads == 0 {
            return Err("max concurrent uploads must be at least 1".into());
        }
        for (name, value) in [
            ("upload interval", self.upload_interval),
            ("request timeout", self.request_timeout),
            ("rescan interval", self.rescan_interval),
        ] {
            if value.is_zero() {
                return Err(format!("{} must be positive", name).into());
            }
        }
        self.tailer_config().validate()?;
        Ok(())
    }

    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            poll_interval: self.poll_interval,
            truncation_mode: self.truncation_mode.into(),
            max_line_bytes: self.max_line_bytes,
            ..Default::default()
        }
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            batch_size: self.batch_size,
            max_concurrent_uploads: self.max_concurrent_uploads,
            upload_interval: self.upload_interval,
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, ValueEnum)]
pub enum TruncationModeArg {
    Size,
    Legacy,
}

impl From<TruncationModeArg> for TruncationMode {
    fn from(value: TruncationModeArg) -> Self {
        match value {
            TruncationModeArg::Size => TruncationMode::Size,
            TruncationModeArg::Legacy => TruncationMode::Legacy,
        }
    }
}
