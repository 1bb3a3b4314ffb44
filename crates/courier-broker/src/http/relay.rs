//! Relay-path handlers: producer submit, consumer long-poll, consumer
//! response delivery.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use courier_core::envelope::{CORRELATION_FIELD, split_correlation};

use crate::broker::SubmitOutcome;

use super::AppState;

/// Producer endpoint: accepts an opaque JSON payload, blocks until the
/// consumer responds or the request timeout elapses.
pub async fn submit(State(state): State<Arc<AppState>>, Json(payload): Json<Value>) -> Response {
    if !payload.is_object() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "request body must be a JSON object"})),
        )
            .into_response();
    }

    match state.broker.submit(payload).await {
        SubmitOutcome::Resolved(response) => Json(response).into_response(),
        SubmitOutcome::TimedOut { error, .. } => {
            (StatusCode::GATEWAY_TIMEOUT, Json(error)).into_response()
        }
    }
}

/// Consumer long-poll endpoint: waits briefly for a queued request.
/// Every call counts as consumer activity.
pub async fn poll(State(state): State<Arc<AppState>>) -> Response {
    state.broker.note_consumer_activity().await;

    match state
        .broker
        .queue
        .pop(state.broker.config.poll_timeout())
        .await
    {
        Some(entry) => Json(entry.tagged()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Consumer response endpoint: resolves the pending request matching the
/// correlation id carried in the body.
pub async fn deliver_response(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Response {
    let frame = split_correlation(payload);
    let Some(id) = frame.id else {
        state
            .broker
            .log("WARNING", "Response missing correlation id")
            .await;
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Missing '{CORRELATION_FIELD}' field")})),
        )
            .into_response();
    };

    if state.broker.resolve(&id, frame.payload).await {
        Json(json!({"status": "ok"})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown correlation id"})),
        )
            .into_response()
    }
}
