//! Ordered hand-off of pending requests to consumer transports.
//!
//! Strict FIFO with a wake signal for waiting consumers. Both transports
//! may pop concurrently; the first to pop wins and no entry is ever handed
//! to two consumers. `push_front` restores an entry to the head after a
//! failed delivery so the next attempt preserves ordering.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use courier_core::Envelope;

/// FIFO delivery queue shared by the long-poll and socket transports.
pub struct DeliveryQueue {
    entries: Mutex<VecDeque<Envelope>>,
    notify: Notify,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append an entry and wake one waiting consumer.
    pub async fn push(&self, entry: Envelope) {
        self.entries.lock().await.push_back(entry);
        self.notify.notify_one();
    }

    /// Re-insert an entry at the head, making it the next to be delivered.
    pub async fn push_front(&self, entry: Envelope) {
        self.entries.lock().await.push_front(entry);
        self.notify.notify_one();
    }

    /// Remove and return the head entry without waiting.
    pub async fn try_pop(&self) -> Option<Envelope> {
        self.entries.lock().await.pop_front()
    }

    /// Remove and return the head entry, waiting up to `max_wait` for one
    /// to arrive. Returns `None` if the queue stayed empty.
    pub async fn pop(&self, max_wait: Duration) -> Option<Envelope> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(entry) = self.try_pop().await {
                return Some(entry);
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop().await;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}
