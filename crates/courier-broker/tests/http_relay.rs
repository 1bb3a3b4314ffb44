//! End-to-end tests for the HTTP transport: a real listener on an
//! ephemeral port, driven with a real HTTP client.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;

use courier_broker::broker::Broker;
use courier_broker::http::{self, AppState};
use courier_core::config::BrokerConfig;

const CORRELATION_FIELD: &str = courier_core::CORRELATION_FIELD;

struct TestServer {
    base: String,
    broker: Arc<Broker>,
    shutdown: watch::Sender<bool>,
}

async fn start_server(mut config: BrokerConfig) -> TestServer {
    config.history_path = None;
    config.autosave = false;

    let broker = Arc::new(Broker::new(config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        broker: Arc::clone(&broker),
        shutdown: shutdown_tx.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(http::serve(state, listener, shutdown_rx));

    TestServer {
        base: format!("http://{addr}"),
        broker,
        shutdown: shutdown_tx,
    }
}

/// Poll until a queued request shows up, mimicking a long-polling consumer.
async fn poll_until_request(client: &reqwest::Client, base: &str) -> Value {
    for _ in 0..20 {
        let response = client
            .post(format!("{base}/poll"))
            .send()
            .await
            .unwrap();
        if response.status() == reqwest::StatusCode::OK {
            return response.json().await.unwrap();
        }
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    }
    panic!("no request appeared on the poll endpoint");
}

#[tokio::test]
async fn submit_poll_response_round_trip() {
    let server = start_server(BrokerConfig::default()).await;
    let client = reqwest::Client::new();

    let submit_base = server.base.clone();
    let submit_client = client.clone();
    let submit = tokio::spawn(async move {
        submit_client
            .post(format!("{submit_base}/request"))
            .json(&json!({"label": "ping"}))
            .send()
            .await
            .unwrap()
    });

    // Consumer side: fetch the queued request, answer it
    let item = poll_until_request(&client, &server.base).await;
    let id = item[CORRELATION_FIELD].as_str().unwrap().to_string();
    assert_eq!(item["label"], "ping");

    let delivered = client
        .post(format!("{}/response", server.base))
        .json(&json!({(CORRELATION_FIELD): id, "result": "pong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(delivered.status(), reqwest::StatusCode::OK);

    // Producer side: unblocked with the consumer's payload
    let response = submit.await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"result": "pong"}));

    // Counters reflect the round trip
    let status: Value = client
        .get(format!("{}/api/status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["requests_total"], 1);
    assert_eq!(status["requests_success"], 1);
    assert_eq!(status["pending_requests"], 0);

    // And the round trip landed in history
    let history: Vec<Value> = client
        .get(format!("{}/api/requests", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["outcome"], "success");
}

#[tokio::test]
async fn empty_poll_returns_no_content() {
    let config = BrokerConfig {
        poll_timeout_ms: 50,
        ..BrokerConfig::default()
    };
    let server = start_server(config).await;

    let response = reqwest::Client::new()
        .post(format!("{}/poll", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn submit_times_out_with_structured_error() {
    let config = BrokerConfig {
        request_timeout_secs: 1,
        ..BrokerConfig::default()
    };
    let server = start_server(config).await;

    let response = reqwest::Client::new()
        .post(format!("{}/request", server.base))
        .json(&json!({"label": "ping"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "timeout");

    let status: Value = reqwest::Client::new()
        .get(format!("{}/api/status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["requests_timeout"], 1);
}

#[tokio::test]
async fn response_with_unknown_id_is_rejected() {
    let server = start_server(BrokerConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/response", server.base))
        .json(&json!({(CORRELATION_FIELD): "no-such-id", "result": "pong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_without_id_is_a_bad_request() {
    let server = start_server(BrokerConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/response", server.base))
        .json(&json!({"result": "pong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_rejects_non_object_payload() {
    let server = start_server(BrokerConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/request", server.base))
        .json(&json!(42))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn poll_marks_consumer_connected() {
    let config = BrokerConfig {
        poll_timeout_ms: 10,
        ..BrokerConfig::default()
    };
    let server = start_server(config).await;
    let client = reqwest::Client::new();

    let _ = client
        .post(format!("{}/poll", server.base))
        .send()
        .await
        .unwrap();

    let status: Value = client
        .get(format!("{}/api/status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["consumer_connected"], true);
    assert!(status["consumer_last_activity"].is_string());
}

#[tokio::test]
async fn history_endpoints_cover_detail_and_clear() {
    let server = start_server(BrokerConfig::default()).await;
    let client = reqwest::Client::new();

    // Produce one timed-out request so history has a record
    let broker = Arc::clone(&server.broker);
    broker
        .submit_with_deadline(json!({"label": "ping"}), Duration::from_millis(20))
        .await;

    let history: Vec<Value> = client
        .get(format!("{}/api/requests", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let id = history[0]["id"].as_str().unwrap();

    let detail = client
        .get(format!("{}/api/requests/{id}", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(detail.status(), reqwest::StatusCode::OK);

    let missing = client
        .get(format!("{}/api/requests/not-a-real-id", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let export = client
        .get(format!("{}/api/history/export", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(export.status(), reqwest::StatusCode::OK);
    assert!(
        export
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .is_some()
    );
    let document: Value = export.json().await.unwrap();
    assert!(document["saved_at"].is_string());
    assert_eq!(document["requests"].as_array().unwrap().len(), 1);

    let cleared = client
        .post(format!("{}/api/history/clear", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), reqwest::StatusCode::OK);

    let history: Vec<Value> = client
        .get(format!("{}/api/requests", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn logs_endpoint_returns_recent_entries() {
    let server = start_server(BrokerConfig::default()).await;

    server.broker.log("INFO", "hello from the test").await;

    let logs: Vec<Value> = reqwest::Client::new()
        .get(format!("{}/api/logs?limit=10", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(
        logs.iter()
            .any(|entry| entry["message"] == "hello from the test")
    );
}

#[tokio::test]
async fn config_endpoint_reports_effective_settings() {
    let config = BrokerConfig {
        request_timeout_secs: 7,
        ..BrokerConfig::default()
    };
    let server = start_server(config).await;

    let body: Value = reqwest::Client::new()
        .get(format!("{}/api/config", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["request_timeout_secs"], 7);
    assert_eq!(body["autosave"], false);
}

#[tokio::test]
async fn exit_endpoint_answers_then_signals_shutdown() {
    let config = BrokerConfig {
        shutdown_grace_ms: 50,
        ..BrokerConfig::default()
    };
    let server = start_server(config).await;
    let mut shutdown_rx = server.shutdown.subscribe();

    let response = reqwest::Client::new()
        .post(format!("{}/api/exit", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(2), shutdown_rx.changed())
        .await
        .expect("shutdown signal not sent")
        .unwrap();
    assert!(*shutdown_rx.borrow());
}

#[tokio::test]
async fn event_stream_starts_with_a_status_snapshot() {
    let server = start_server(BrokerConfig::default()).await;

    let response = reqwest::Client::new()
        .get(format!("{}/events", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut stream = response.bytes_stream();
    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !collected.contains("status_update") {
        let chunk = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("no SSE data before deadline")
            .expect("stream ended early")
            .unwrap();
        collected.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(collected.contains("consumer_connected"));
}
