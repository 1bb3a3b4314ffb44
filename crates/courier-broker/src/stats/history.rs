//! History persistence: a reloadable JSON document on disk.
//!
//! Durability is best-effort and never a correctness guarantee of the
//! relay: save failures are logged by callers and otherwise swallowed.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::Result;

use super::{HistoryRecord, StatsRecorder};

/// The persisted document shape: save timestamp plus the ring contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub saved_at: DateTime<Utc>,
    pub requests: Vec<HistoryRecord>,
}

impl StatsRecorder {
    /// Snapshot the current ring as a document.
    pub async fn export(&self) -> HistoryDocument {
        HistoryDocument {
            saved_at: Utc::now(),
            requests: self.history().await,
        }
    }

    /// Serialize the current ring to `path`, creating parent directories
    /// as needed. The snapshot is taken under the lock; the write happens
    /// outside it.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let document = self.export().await;
        let bytes = serde_json::to_vec_pretty(&document)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Repopulate the ring from a previously saved document. A missing
    /// file is not an error; returns the number of loaded records.
    pub async fn load_from(&self, path: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(0);
        }
        let bytes = tokio::fs::read(path).await?;
        let document: HistoryDocument = serde_json::from_slice(&bytes)?;
        let count = document.requests.len();
        self.replace_history(document.requests).await;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::super::RecordOutcome;
    use super::*;

    fn record(id: &str) -> HistoryRecord {
        HistoryRecord {
            id: id.into(),
            label: "ping".into(),
            latency_ms: 3.5,
            outcome: RecordOutcome::Success,
            timestamp: Utc::now(),
            request_payload: serde_json::json!({"label": "ping"}),
            response_payload: serde_json::json!({"result": "pong"}),
        }
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let stats = StatsRecorder::new(10);
        stats.record(record("a")).await;
        stats.record(record("b")).await;
        stats.save_to(&path).await.unwrap();

        let restored = StatsRecorder::new(10);
        let loaded = restored.load_from(&path).await.unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(restored.history().await, stats.history().await);
    }

    #[tokio::test]
    async fn load_missing_file_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsRecorder::new(10);
        let loaded = stats.load_from(&dir.path().join("absent.json")).await;
        assert_eq!(loaded.unwrap(), 0);
    }

    #[tokio::test]
    async fn load_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"{broken").await.unwrap();

        let stats = StatsRecorder::new(10);
        assert!(stats.load_from(&path).await.is_err());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("history.json");

        let stats = StatsRecorder::new(10);
        stats.record(record("a")).await;
        stats.save_to(&path).await.unwrap();

        let document: HistoryDocument =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(document.requests.len(), 1);
    }
}
