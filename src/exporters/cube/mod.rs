// SPDX-License-Identifier: Apache-2.0

//! Delivery of buffered events to a Cube collector.
//!
//! The [`CubeUploader`] periodically swaps the [`EventBuffer`] contents out in
//! fixed-size batches and sends them with bounded concurrency. A batch that
//! fails to send is appended back to the buffer and retried on a later round.

mod client;
mod errors;

pub use client::{CubeClient, DEFAULT_REQUEST_TIMEOUT, EVENT_PUT_PATH, event_put_uri};
pub use errors::ExportError;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::select;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::event::Event;
use crate::topology::event_buffer::EventBuffer;

/// Destination for event batches.
pub trait EventSink: Send + Sync + 'static {
    fn put_events(&self, batch: &[Event]) -> impl Future<Output = Result<(), ExportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum events per request
    pub batch_size: usize,
    /// Maximum requests in flight during a round
    pub max_concurrent_uploads: usize,
    pub upload_interval: Duration,
    /// Rounds attempted after cancellation before giving up
    pub shutdown_drain_rounds: usize,
    pub shutdown_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_concurrent_uploads: 5,
            upload_interval: Duration::from_secs(5),
            shutdown_drain_rounds: 1,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one upload round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub batches: usize,
    pub delivered_batches: usize,
    pub failed_batches: usize,
    pub delivered_events: usize,
    pub requeued_events: usize,
}

pub struct CubeUploader<S> {
    sink: S,
    buffer: EventBuffer,
    config: UploaderConfig,
    /// Events taken from the buffer whose send has not completed
    in_flight: AtomicUsize,
}

impl<S: EventSink> CubeUploader<S> {
    pub fn new(sink: S, buffer: EventBuffer, config: UploaderConfig) -> Self {
        Self {
            sink,
            buffer,
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Send everything currently buffered. Returns once every batch has either
    /// been delivered or put back in the buffer.
    pub async fn upload_round(&self) -> RoundReport {
        let batches = self.buffer.take_batches(self.config.batch_size);
        if batches.is_empty() {
            return RoundReport::default();
        }

        let mut report = RoundReport {
            batches: batches.len(),
            ..Default::default()
        };
        let total: usize = batches.iter().map(Vec::len).sum();
        self.in_flight.fetch_add(total, Ordering::SeqCst);

        let mut sends = stream::iter(batches)
            .map(|batch| async move {
                let res = self.sink.put_events(&batch).await;
                (batch, res)
            })
            .buffer_unordered(self.config.max_concurrent_uploads.max(1));

        while let Some((batch, res)) = sends.next().await {
            let count = batch.len();
            match res {
                Ok(()) => {
                    report.delivered_batches += 1;
                    report.delivered_events += count;
                }
                Err(e) => {
                    warn!(events = count, error = %e, "Failed to deliver batch, re-enqueueing");
                    report.failed_batches += 1;
                    report.requeued_events += count;
                    self.buffer.extend(batch);
                }
            }
            self.in_flight.fetch_sub(count, Ordering::SeqCst);
        }

        report
    }

    /// Events not yet delivered, including any in an interrupted round
    pub fn pending_events(&self) -> usize {
        self.buffer.len() + self.in_flight.load(Ordering::SeqCst)
    }

    /// Run upload rounds on an interval until cancelled, then make a bounded
    /// attempt to drain the buffer.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let mut ticker = tokio::time::interval(self.config.upload_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Uploader cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.upload_round().await;
                    if report.batches > 0 {
                        debug!(
                            batches = report.batches,
                            delivered = report.delivered_events,
                            requeued = report.requeued_events,
                            "Upload round finished"
                        );
                    }
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let rounds = self.config.shutdown_drain_rounds;
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            for _ in 0..rounds {
                if self.buffer.is_empty() {
                    break;
                }
                self.upload_round().await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                timeout = ?self.config.shutdown_timeout,
                "Timed out draining event buffer"
            );
        }

        match self.pending_events() {
            0 => info!("Event buffer drained"),
            lost => error!(events = lost, "Shutting down with undelivered events"),
        }
    }
}
