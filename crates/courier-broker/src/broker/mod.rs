//! The broker context: one object owning every relay component.
//!
//! Constructed once in `main` and shared as `Arc<Broker>` with the HTTP
//! handlers and the socket relay. The producer path (`submit`) and consumer
//! path (`resolve`) both run through here so that statistics, history,
//! logging, and event broadcasts stay consistent across transports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use courier_core::Envelope;
use courier_core::config::BrokerConfig;
use courier_core::envelope::request_label;

use crate::events::{BrokerEvent, EventBus};
use crate::liveness::{LivenessMonitor, Transition};
use crate::logbuf::LogBuffer;
use crate::queue::DeliveryQueue;
use crate::registry::{RequestRegistry, WaitOutcome};
use crate::stats::{HistoryRecord, RecordOutcome, StatsRecorder};

/// Outcome of a producer submission.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The consumer's response payload, verbatim.
    Resolved(Value),
    /// The deadline elapsed; `error` is the structured timeout body.
    TimedOut { id: String, error: Value },
}

/// The structured error returned to a producer whose deadline elapsed.
pub fn timeout_error_body(id: &str) -> Value {
    serde_json::json!({
        "error": {
            "code": "timeout",
            "message": "Consumer did not respond within the deadline",
        },
        "correlation_id": id,
    })
}

/// Process-wide broker state. No ambient/static state anywhere: every
/// component lives here and is reached through this object.
pub struct Broker {
    pub config: BrokerConfig,
    pub registry: RequestRegistry,
    pub queue: DeliveryQueue,
    pub events: EventBus,
    pub liveness: LivenessMonitor,
    pub stats: StatsRecorder,
    pub logs: LogBuffer,
    started_at: Instant,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            registry: RequestRegistry::new(),
            queue: DeliveryQueue::new(),
            events: EventBus::new(config.event_capacity),
            liveness: LivenessMonitor::new(config.liveness_timeout()),
            stats: StatsRecorder::new(config.history_capacity),
            logs: LogBuffer::new(config.log_capacity),
            started_at: Instant::now(),
            config,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Submit a request with the configured deadline. Blocks the caller
    /// until resolution or timeout.
    pub async fn submit(self: &Arc<Self>, payload: Value) -> SubmitOutcome {
        self.submit_with_deadline(payload, self.config.request_timeout())
            .await
    }

    /// Submit a request, blocking up to `deadline` for its response.
    pub async fn submit_with_deadline(
        self: &Arc<Self>,
        payload: Value,
        deadline: Duration,
    ) -> SubmitOutcome {
        let label = request_label(&payload);
        let (id, rx) = self.registry.insert().await;
        let started = Instant::now();

        self.log("DEBUG", &format!("Request {}: {label}", short_id(&id)))
            .await;

        self.queue
            .push(Envelope {
                id: id.clone(),
                payload: payload.clone(),
            })
            .await;
        self.stats.mark_submitted().await;
        self.events.broadcast(BrokerEvent::request_started(&id, &label));

        match self.registry.wait(&id, rx, deadline).await {
            WaitOutcome::Resolved(response) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let record = HistoryRecord {
                    id: id.clone(),
                    label: label.clone(),
                    latency_ms,
                    outcome: RecordOutcome::Success,
                    timestamp: Utc::now(),
                    request_payload: payload,
                    response_payload: response.clone(),
                };
                self.events.broadcast(BrokerEvent::RequestCompleted {
                    id: id.clone(),
                    label,
                    latency_ms,
                    success: true,
                    error: None,
                    request_payload: record.request_payload.clone(),
                    response_payload: response.clone(),
                    timestamp: record.timestamp,
                });
                self.stats.record(record).await;
                self.persist_history();
                self.log(
                    "DEBUG",
                    &format!("Request {} completed in {latency_ms:.0}ms", short_id(&id)),
                )
                .await;
                SubmitOutcome::Resolved(response)
            }
            WaitOutcome::TimedOut => {
                let latency_ms = deadline.as_secs_f64() * 1000.0;
                let error = timeout_error_body(&id);
                let record = HistoryRecord {
                    id: id.clone(),
                    label: label.clone(),
                    latency_ms,
                    outcome: RecordOutcome::Timeout,
                    timestamp: Utc::now(),
                    request_payload: payload,
                    response_payload: error.clone(),
                };
                self.events.broadcast(BrokerEvent::RequestCompleted {
                    id: id.clone(),
                    label,
                    latency_ms,
                    success: false,
                    error: Some("timeout".into()),
                    request_payload: record.request_payload.clone(),
                    response_payload: error.clone(),
                    timestamp: record.timestamp,
                });
                self.stats.record(record).await;
                self.persist_history();
                self.log("WARNING", &format!("Request {} timed out", short_id(&id)))
                    .await;
                SubmitOutcome::TimedOut { id, error }
            }
        }
    }

    /// Resolve a pending request from either transport. Returns `false`
    /// for unknown correlation ids, which are logged and discarded.
    pub async fn resolve(&self, id: &str, payload: Value) -> bool {
        if self.registry.resolve(id, payload).await {
            self.log(
                "DEBUG",
                &format!("Response received for {}", short_id(id)),
            )
            .await;
            true
        } else {
            self.log(
                "WARNING",
                &format!("No pending request for id {}", short_id(id)),
            )
            .await;
            false
        }
    }

    /// Record observed consumer activity (poll call or socket traffic).
    pub async fn note_consumer_activity(&self) {
        if let Some(transition) = self.liveness.touch().await {
            self.apply_transition(transition).await;
        }
    }

    /// Recompute liveness from activity recency; driven by the sweeper
    /// task and by on-demand status checks.
    pub async fn refresh_liveness(&self) {
        if let Some(transition) = self.liveness.check().await {
            self.apply_transition(transition).await;
        }
    }

    async fn apply_transition(&self, transition: Transition) {
        let connected = transition == Transition::Connected;
        let word = if connected { "connected" } else { "disconnected" };
        self.log("INFO", &format!("Consumer {word}")).await;
        self.events.broadcast(BrokerEvent::status_update(connected));
    }

    /// Log a message to tracing, the dashboard ring, and the event stream.
    /// The broadcast happens outside any lock.
    pub async fn log(&self, level: &str, message: &str) {
        match level {
            "ERROR" => error!("{message}"),
            "WARNING" => warn!("{message}"),
            "DEBUG" => debug!("{message}"),
            _ => info!("{message}"),
        }
        let entry = self.logs.push(level, message).await;
        self.events.broadcast(BrokerEvent::LogEntry {
            level: entry.level,
            message: entry.message,
            timestamp: entry.timestamp,
        });
    }

    /// Dispatch a best-effort history save off the hot path. Failures are
    /// logged and never propagated.
    pub fn persist_history(self: &Arc<Self>) {
        if !self.config.autosave {
            return;
        }
        let Some(path) = self.config.history_path.clone() else {
            return;
        };
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = broker.stats.save_to(&path).await {
                warn!(error = %e, "Failed to save history");
            }
        });
    }

    /// Synchronous (awaited) save for the manual save endpoint.
    pub async fn save_history_now(&self) -> courier_core::Result<std::path::PathBuf> {
        let path = self.config.history_path.clone().ok_or_else(|| {
            courier_core::Error::Config("history persistence disabled".into())
        })?;
        self.stats.save_to(&path).await?;
        Ok(path)
    }

    /// Reload the ring from the persisted document.
    pub async fn load_history_now(&self) -> courier_core::Result<usize> {
        let path = self.config.history_path.clone().ok_or_else(|| {
            courier_core::Error::Config("history persistence disabled".into())
        })?;
        self.stats.load_from(&path).await
    }

    /// Clear the ring and drop the on-disk document, best effort.
    pub async fn clear_history(&self) {
        self.stats.clear_history().await;
        if let Some(path) = &self.config.history_path {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    /// Spawn the periodic liveness recomputation task.
    pub fn spawn_liveness_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(broker.config.liveness_sweep());
            timer.tick().await; // Skip first immediate tick
            loop {
                tokio::select! {
                    _ = timer.tick() => broker.refresh_liveness().await,
                    _ = shutdown.changed() => {
                        debug!("Liveness sweeper shutting down");
                        return;
                    }
                }
            }
        })
    }
}

/// Shortened id for log lines, mirroring the full id's first 8 characters.
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
