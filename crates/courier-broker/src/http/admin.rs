//! Operator surface: status, history, logs, config, shutdown.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logbuf::LogEntry;
use crate::stats::{HistoryRecord, StatsSnapshot};

use super::AppState;

/// Full broker status, as reported by `/api/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: f64,
    pub consumer_connected: bool,
    pub consumer_last_activity: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub pending_requests: usize,
    pub queue_depth: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let broker = &state.broker;
    broker.refresh_liveness().await;

    Json(StatusResponse {
        uptime_seconds: broker.uptime().as_secs_f64(),
        consumer_connected: broker.liveness.is_connected().await,
        consumer_last_activity: broker.liveness.last_seen().await,
        counters: broker.stats.snapshot().await,
        pending_requests: broker.registry.pending_count().await,
        queue_depth: broker.queue.len().await,
    })
}

pub async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryRecord>> {
    Json(state.broker.stats.history().await)
}

pub async fn request_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.broker.stats.find(&id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "request not found"})),
        )
            .into_response(),
    }
}

pub async fn export_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let document = state.broker.stats.export().await;
    (
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=courier_history.json",
        )],
        Json(document),
    )
}

pub async fn save_history(State(state): State<Arc<AppState>>) -> Response {
    match state.broker.save_history_now().await {
        Ok(path) => Json(json!({"status": "ok", "file": path.display().to_string()})).into_response(),
        Err(e) => {
            state
                .broker
                .log("ERROR", &format!("Failed to save history: {e}"))
                .await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn load_history(State(state): State<Arc<AppState>>) -> Response {
    match state.broker.load_history_now().await {
        Ok(loaded) => Json(json!({"status": "ok", "loaded": loaded})).into_response(),
        Err(e) => {
            state
                .broker
                .log("ERROR", &format!("Failed to load history: {e}"))
                .await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.broker.clear_history().await;
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
}

pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    let limit = query.limit.unwrap_or(100);
    Json(state.broker.logs.recent(query.level.as_deref(), limit).await)
}

pub async fn config(State(state): State<Arc<AppState>>) -> Json<courier_core::config::BrokerConfig> {
    Json(state.broker.config.clone())
}

pub async fn test_consumer(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.broker.refresh_liveness().await;
    let connected = state.broker.liveness.is_connected().await;

    Json(json!({
        "consumer_connected": connected,
        "message": if connected {
            "Consumer is connected"
        } else {
            "Consumer not connected"
        },
    }))
}

/// Answer first, then terminate after a short grace delay so the response
/// reaches the caller.
pub async fn exit(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.broker.log("INFO", "Exit requested via API").await;

    let shutdown = state.shutdown.clone();
    let grace = state.broker.config.shutdown_grace();
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let _ = shutdown.send(true);
    });

    Json(json!({"status": "ok", "message": "Broker shutting down"}))
}
