// SPDX-License-Identifier: Apache-2.0

use crate::crypto::init_crypto_provider;
use crate::exporters::cube::{CubeClient, CubeUploader};
use crate::init::args::AgentRun;
use crate::init::config::Config;
use crate::init::wait::{self, TaskSet};
use crate::receivers::file::{CheckpointStore, JsonFileCheckpointStore, SourceWatcher};
use crate::topology::event_buffer::EventBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

/// Time allowed for tailers to stop and flush their checkpoints
const RECEIVERS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Agent {
    config: Box<AgentRun>,
    environment: String,
}

impl Agent {
    pub fn new(config: Box<AgentRun>, environment: String) -> Self {
        Self {
            config,
            environment,
        }
    }

    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!(environment = %self.environment, "Starting log-to-cube.");

        config.validate()?;
        init_crypto_provider()?;

        let file_config = Config::load(&config.config)?;
        let sources = file_config.compile()?;
        if sources.is_empty() {
            warn!(config = %config.config, "No sources configured, nothing will be tailed");
        }

        let store: Arc<dyn CheckpointStore> =
            Arc::new(JsonFileCheckpointStore::new(&config.checkpoint_db));
        let buffer = EventBuffer::new();

        let receivers_cancel = CancellationToken::new();
        let exporters_cancel = CancellationToken::new();
        let mut receivers_task_set = TaskSet::new();
        let mut exporters_task_set = TaskSet::new();

        let mut watcher = SourceWatcher::new(
            sources,
            store,
            buffer.clone(),
            config.tailer_config(),
            config.rescan_interval,
        );
        // Failing to read a checkpoint here is fatal
        watcher.start(&receivers_cancel).await?;

        let client = CubeClient::build(&file_config.cube, config.request_timeout)?;
        info!(endpoint = %client.uri(), "Shipping events to Cube");
        let uploader = CubeUploader::new(client, buffer, config.uploader_config());
        let drain_timeout = uploader.config().shutdown_timeout;

        {
            let token = receivers_cancel.clone();
            receivers_task_set.spawn(async move { watcher.run(token).await.map_err(|e| e.into()) });
        }
        {
            let token = exporters_cancel.clone();
            exporters_task_set.spawn(async move { uploader.run(token).await });
        }

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut receivers_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of source watcher."),
                    Err(e) => result = Err(e),
                }
            },
            e = wait::wait_for_any_task(&mut exporters_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of uploader."),
                    Err(e) => result = Err(e),
                }
            },
        }

        // Stop the tailers first so their last lines reach the buffer before
        // the uploader drains it.
        receivers_cancel.cancel();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut receivers_task_set, RECEIVERS_STOP_TIMEOUT).await
        {
            warn!(error = %e, "Source watcher did not stop cleanly");
        }

        exporters_cancel.cancel();
        let res = wait::wait_for_tasks_with_timeout(
            &mut exporters_task_set,
            drain_timeout + Duration::from_secs(1),
        )
        .await;
        if let Err(e) = res {
            return Err(format!("timed out waiting for uploader to exit: {}", e).into());
        }

        info!("Agent stopped.");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn write_config(dir: &TempDir, cube: &str, log: &std::path::Path) -> String {
        let path = dir.path().join("config.json");
        let contents = serde_json::json!({
            "cube": cube,
            "sources": [
                {"path": log, "pattern": r"(?P<word>\w+) (?P<n>\d+)", "type": "test",
                 "cast": {"n": "integer"}}
            ]
        });
        fs::write(&path, contents.to_string()).unwrap();
        path.display().to_string()
    }

    fn agent_args(dir: &TempDir, config: String) -> Box<AgentRun> {
        Box::new(AgentRun {
            config,
            checkpoint_db: dir.path().join("data.db").display().to_string(),
            upload_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_ships_lines_and_stops() {
        let server = MockServer::start();
        let put_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/1.0/event/put")
                .body_contains("\"word\":\"hello\"");
            then.status(200);
        });

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        fs::write(&log, "hello 1\nskip me\n").unwrap();
        let config = write_config(&dir, &format!("http://127.0.0.1:{}", server.port()), &log);

        let cancel = CancellationToken::new();
        let agent = Agent::new(agent_args(&dir, config), "test".to_string());
        let handle = tokio::spawn(agent.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(10), async {
            while put_mock.hits() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        assert_ok!(handle.await.unwrap());

        let db: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("data.db")).unwrap())
                .unwrap();
        assert_eq!(db[log.display().to_string()]["offset"], 16);
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let args = agent_args(&dir, dir.path().join("nope.json").display().to_string());

        let res = Agent::new(args, "test".to_string())
            .run(CancellationToken::new())
            .await;
        assert_err!(res);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_db_is_fatal() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        fs::write(&log, "hello 1\n").unwrap();
        fs::write(dir.path().join("data.db"), "{not json").unwrap();
        let config = write_config(&dir, "http://127.0.0.1:1", &log);

        let res = Agent::new(agent_args(&dir, config), "test".to_string())
            .run(CancellationToken::new())
            .await;
        assert_err!(res);
    }
}
