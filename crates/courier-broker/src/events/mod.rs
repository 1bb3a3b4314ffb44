//! Relay event vocabulary and best-effort observer fan-out.
//!
//! Events are broadcast to however many observers are currently subscribed.
//! Delivery is best-effort: a slow observer lags and misses events, a
//! dropped observer is removed by the channel itself, and sending never
//! blocks the relay path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Lifecycle events observable on the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    RequestStarted {
        id: String,
        label: String,
        timestamp: DateTime<Utc>,
    },
    RequestCompleted {
        id: String,
        label: String,
        latency_ms: f64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        request_payload: Value,
        response_payload: Value,
        timestamp: DateTime<Utc>,
    },
    StatusUpdate {
        consumer_connected: bool,
        timestamp: DateTime<Utc>,
    },
    LogEntry {
        level: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl BrokerEvent {
    pub fn request_started(id: &str, label: &str) -> Self {
        Self::RequestStarted {
            id: id.to_string(),
            label: label.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn status_update(consumer_connected: bool) -> Self {
        Self::StatusUpdate {
            consumer_connected,
            timestamp: Utc::now(),
        }
    }

    pub fn log_entry(level: &str, message: &str) -> Self {
        Self::LogEntry {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Best-effort fan-out of [`BrokerEvent`]s to live observers.
pub struct EventBus {
    tx: broadcast::Sender<BrokerEvent>,
}

impl EventBus {
    /// `capacity` bounds how far an observer may lag before missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to all current observers. Never blocks and never
    /// fails: with no observers the event is simply dropped.
    pub fn broadcast(&self, event: BrokerEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "Event broadcast"),
            Err(_) => debug!("No observers for broadcast"),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
