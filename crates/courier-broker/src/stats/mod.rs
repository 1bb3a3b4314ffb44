//! Request statistics: counters, running mean latency, history ring.
//!
//! The mean latency covers successful requests only and is recomputed from
//! the accumulated latency sum on each record (a cumulative average, not a
//! moving one). The history ring holds the most recent K records, evicting
//! the oldest on append; records are never mutated after append, only
//! removed by an explicit clear.

mod history;

pub use history::HistoryDocument;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// Terminal outcome of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    Success,
    Timeout,
    Error,
}

/// One completed request as kept in history and persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub label: String,
    pub latency_ms: f64,
    pub outcome: RecordOutcome,
    pub timestamp: DateTime<Utc>,
    pub request_payload: Value,
    pub response_payload: Value,
}

/// Counter snapshot for the status endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub requests_timeout: u64,
    pub avg_latency_ms: f64,
}

struct StatsInner {
    total: u64,
    succeeded: u64,
    failed: u64,
    timed_out: u64,
    total_latency_ms: f64,
    history: VecDeque<HistoryRecord>,
}

pub struct StatsRecorder {
    inner: Mutex<StatsInner>,
    capacity: usize,
}

impl StatsRecorder {
    /// `capacity` is K, the history ring bound.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                total: 0,
                succeeded: 0,
                failed: 0,
                timed_out: 0,
                total_latency_ms: 0.0,
                history: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Count a submitted request before its outcome is known.
    pub async fn mark_submitted(&self) {
        self.inner.lock().await.total += 1;
    }

    /// Record a terminal outcome and append it to the history ring.
    pub async fn record(&self, record: HistoryRecord) {
        let mut inner = self.inner.lock().await;
        match record.outcome {
            RecordOutcome::Success => {
                inner.succeeded += 1;
                inner.total_latency_ms += record.latency_ms;
            }
            RecordOutcome::Timeout => inner.timed_out += 1,
            RecordOutcome::Error => inner.failed += 1,
        }
        if inner.history.len() == self.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(record);
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().await;
        StatsSnapshot {
            requests_total: inner.total,
            requests_success: inner.succeeded,
            requests_failed: inner.failed,
            requests_timeout: inner.timed_out,
            avg_latency_ms: if inner.succeeded == 0 {
                0.0
            } else {
                inner.total_latency_ms / inner.succeeded as f64
            },
        }
    }

    /// Recent records, oldest first.
    pub async fn history(&self) -> Vec<HistoryRecord> {
        self.inner.lock().await.history.iter().cloned().collect()
    }

    pub async fn find(&self, id: &str) -> Option<HistoryRecord> {
        self.inner
            .lock()
            .await
            .history
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history.len()
    }

    pub async fn clear_history(&self) {
        self.inner.lock().await.history.clear();
    }

    /// Replace the ring contents, keeping at most the newest K records.
    pub async fn replace_history(&self, records: Vec<HistoryRecord>) {
        let mut inner = self.inner.lock().await;
        inner.history.clear();
        for record in records {
            if inner.history.len() == self.capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(record);
        }
    }
}
