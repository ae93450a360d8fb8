// SPDX-License-Identifier: Apache-2.0

//! The shared buffer of events waiting for delivery.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::Event;

/// Ordered, lock-protected sequence of undelivered events.
///
/// Cloning is cheap and yields a handle to the same buffer. Extractors append,
/// the uploader swaps the contents out in batches and appends failed batches
/// back. The lock is only ever held for the push, extend or swap itself.
#[derive(Clone, Default)]
pub struct EventBuffer {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // A panicking holder cannot leave the Vec half-modified, so keep going
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// Append events to the tail, e.g. a batch that failed to send.
    pub fn extend(&self, events: impl IntoIterator<Item = Event>) {
        self.lock().extend(events);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take every buffered event, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    /// Atomically take the buffer contents split into contiguous batches of at
    /// most `batch_size` events. Events pushed after this call land in the
    /// (now empty) buffer and are not part of the returned batches.
    pub fn take_batches(&self, batch_size: usize) -> Vec<Vec<Event>> {
        let batch_size = batch_size.max(1);
        let events = self.drain();
        if events.is_empty() {
            return Vec::new();
        }

        let mut batches = Vec::with_capacity(events.len().div_ceil(batch_size));
        let mut events = events.into_iter();
        loop {
            let batch: Vec<Event> = events.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batches.push(batch);
        }
        batches
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.len())
            .finish()
    }
}
