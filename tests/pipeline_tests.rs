// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests: files on disk are tailed, parsed, buffered and posted to
//! a mock Cube collector, with checkpoints carried across restarts.

use httpmock::prelude::*;
use log_to_cube::event::Event;
use log_to_cube::exporters::cube::{
    CubeClient, CubeUploader, DEFAULT_REQUEST_TIMEOUT, EventSink, ExportError, UploaderConfig,
};
use log_to_cube::receivers::file::{
    CheckpointStore, JsonFileCheckpointStore, Source, SourceConfig, SourceWatcher, TailerConfig,
};
use log_to_cube::topology::event_buffer::EventBuffer;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

static INIT_CRYPTO: Once = Once::new();

fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Forwards to the real client and remembers every delivered event.
#[derive(Clone)]
struct RecordingSink {
    client: CubeClient,
    delivered: Arc<Mutex<Vec<Event>>>,
}

impl EventSink for RecordingSink {
    async fn put_events(&self, batch: &[Event]) -> Result<(), ExportError> {
        self.client.put_events(batch).await?;
        self.delivered.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

impl RecordingSink {
    fn words(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.get("word").unwrap().as_str().unwrap().to_string())
            .collect()
    }
}

struct Pipeline {
    cancel: CancellationToken,
    watcher: JoinHandle<log_to_cube::receivers::file::Result<()>>,
    uploader: JoinHandle<Result<(), tower::BoxError>>,
}

impl Pipeline {
    async fn start(dir: &Path, db: &Path, sink: RecordingSink) -> Self {
        let config = SourceConfig {
            glob: Some(format!("{}/*.log", dir.display())),
            pattern: r"^(?P<word>\w+) (?P<n>\d+)$".to_string(),
            event_type: "test".to_string(),
            cast: [("n".to_string(), "integer".to_string())].into(),
            ..Default::default()
        };
        let sources = vec![Arc::new(Source::compile(&config).unwrap())];

        let store: Arc<dyn CheckpointStore> = Arc::new(JsonFileCheckpointStore::new(db));
        let buffer = EventBuffer::new();
        let cancel = CancellationToken::new();

        let mut watcher = SourceWatcher::new(
            sources,
            store,
            buffer.clone(),
            TailerConfig {
                poll_interval: Duration::from_millis(10),
                flush_interval: Duration::from_millis(20),
                ..Default::default()
            },
            Duration::from_millis(50),
        );
        watcher.start(&cancel).await.unwrap();

        let uploader = CubeUploader::new(
            sink,
            buffer,
            UploaderConfig {
                batch_size: 2,
                max_concurrent_uploads: 2,
                upload_interval: Duration::from_millis(20),
                ..Default::default()
            },
        );

        Self {
            watcher: tokio::spawn(watcher.run(cancel.clone())),
            uploader: tokio::spawn(uploader.run(cancel.clone())),
            cancel,
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        assert_ok!(self.watcher.await.unwrap());
        assert_ok!(self.uploader.await.unwrap());
    }
}

fn append(path: &Path, data: &str) {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(data.as_bytes()).unwrap();
}

async fn wait_for(sink: &RecordingSink, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while sink.delivered.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events were not delivered in time");
}

#[tokio::test]
async fn test_tail_ship_and_resume() {
    init_crypto();
    let server = MockServer::start();
    let put_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/1.0/event/put")
            .header("content-type", "application/json");
        then.status(200);
    });

    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir(&logs).unwrap();
    let db = dir.path().join("data.db");
    let log = logs.join("app.log");
    append(&log, "alpha 1\nnot a match line\nbeta 2\n");

    let client = CubeClient::build(&server.base_url(), DEFAULT_REQUEST_TIMEOUT).unwrap();
    let sink = RecordingSink {
        client,
        delivered: Default::default(),
    };

    let pipeline = Pipeline::start(&logs, &db, sink.clone()).await;
    wait_for(&sink, 2).await;

    // A file created after startup is found by the re-scan
    append(&logs.join("late.log"), "gamma 3\n");
    wait_for(&sink, 3).await;
    pipeline.stop().await;

    let mut words = sink.words();
    words.sort();
    assert_eq!(words, vec!["alpha", "beta", "gamma"]);
    let first = sink.delivered.lock().unwrap()[0].clone();
    assert_eq!(first.event_type(), "test");
    assert!(first.get("n").unwrap().is_i64());
    assert!(put_mock.hits() >= 2);

    // Restart: only lines written after the checkpoint are shipped
    append(&log, "delta 4\n");
    let sink2 = RecordingSink {
        client: sink.client.clone(),
        delivered: Default::default(),
    };
    let pipeline = Pipeline::start(&logs, &db, sink2.clone()).await;
    wait_for(&sink2, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    pipeline.stop().await;

    assert_eq!(sink2.words(), vec!["delta"]);
    assert_eq!(
        sink2.delivered.lock().unwrap()[0].get("n"),
        Some(&json!(4))
    );
}

#[tokio::test]
async fn test_collector_outage_is_recovered() {
    init_crypto();
    let server = MockServer::start();
    let mut failing = server.mock(|when, then| {
        when.method(POST).path("/1.0/event/put");
        then.status(503);
    });

    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir(&logs).unwrap();
    let db = dir.path().join("data.db");
    append(&logs.join("app.log"), "one 1\ntwo 2\nthree 3\n");

    let client = CubeClient::build(&server.base_url(), DEFAULT_REQUEST_TIMEOUT).unwrap();
    let sink = RecordingSink {
        client,
        delivered: Default::default(),
    };
    let pipeline = Pipeline::start(&logs, &db, sink.clone()).await;

    tokio::time::timeout(Duration::from_secs(10), async {
        while failing.hits() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(sink.delivered.lock().unwrap().is_empty());

    failing.delete();
    server.mock(|when, then| {
        when.method(POST).path("/1.0/event/put");
        then.status(200);
    });

    wait_for(&sink, 3).await;
    pipeline.stop().await;

    let mut words = sink.words();
    words.sort();
    assert_eq!(words, vec!["one", "three", "two"]);
}
