//! HTTP transport implementation using axum.
//!
//! Carries both the relay endpoints (submit / long-poll / response) and
//! the operator surface (status, history, logs, config, event stream,
//! shutdown).

pub mod admin;
pub mod events;
pub mod relay;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::broker::Broker;

/// Application state shared across handlers.
pub struct AppState {
    pub broker: Arc<Broker>,
    /// Daemon shutdown signal, triggered by the exit endpoint.
    pub shutdown: watch::Sender<bool>,
}

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/request", post(relay::submit))
        .route("/poll", post(relay::poll))
        .route("/response", post(relay::deliver_response))
        .route("/api/status", get(admin::status))
        .route("/api/requests", get(admin::list_requests))
        .route("/api/requests/:id", get(admin::request_detail))
        .route("/api/history/export", get(admin::export_history))
        .route("/api/history/save", post(admin::save_history))
        .route("/api/history/load", post(admin::load_history))
        .route("/api/history/clear", post(admin::clear_history))
        .route("/api/logs", get(admin::logs))
        .route("/api/config", get(admin::config))
        .route("/api/test", post(admin::test_consumer))
        .route("/api/exit", post(admin::exit))
        .route("/events", get(events::stream))
        .layer(cors)
        .with_state(state)
}

/// Serve the HTTP transport until the shutdown signal fires.
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
