//! Bounded ring of recent log entries for the operator surface.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One dashboard-visible log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest at capacity. Returns the entry
    /// for broadcasting.
    pub async fn push(&self, level: &str, message: &str) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
        };
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    /// The most recent entries (up to `limit`), optionally filtered by
    /// level, oldest first.
    pub async fn recent(&self, level: Option<&str>, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().await;
        let filtered: Vec<LogEntry> = entries
            .iter()
            .filter(|e| level.is_none_or(|l| e.level.eq_ignore_ascii_case(l)))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
