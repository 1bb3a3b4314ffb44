//! Thin HTTP client over the broker's operator API.

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tracing::info;

pub struct BrokerClient {
    base: String,
    http: reqwest::Client,
}

impl BrokerClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {path} failed; is the broker running?"))?;
        Ok(response.json().await?)
    }

    async fn post_json(&self, path: &str, body: Option<&Value>) -> Result<(StatusCode, Value)> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("POST {path} failed; is the broker running?"))?;
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    pub async fn status(&self) -> Result<Value> {
        self.get_json("/api/status").await
    }

    pub async fn submit(&self, payload: &Value) -> Result<(StatusCode, Value)> {
        self.post_json("/request", Some(payload)).await
    }

    pub async fn history(&self) -> Result<Value> {
        self.get_json("/api/requests").await
    }

    pub async fn history_record(&self, id: &str) -> Result<Value> {
        self.get_json(&format!("/api/requests/{id}")).await
    }

    pub async fn export(&self) -> Result<String> {
        let response = self
            .http
            .get(self.url("/api/history/export"))
            .send()
            .await
            .context("GET /api/history/export failed; is the broker running?")?;
        Ok(response.text().await?)
    }

    pub async fn clear_history(&self) -> Result<Value> {
        Ok(self.post_json("/api/history/clear", None).await?.1)
    }

    pub async fn save_history(&self) -> Result<(StatusCode, Value)> {
        self.post_json("/api/history/save", None).await
    }

    pub async fn load_history(&self) -> Result<(StatusCode, Value)> {
        self.post_json("/api/history/load", None).await
    }

    pub async fn logs(&self, level: Option<&str>, limit: usize) -> Result<Value> {
        let mut path = format!("/api/logs?limit={limit}");
        if let Some(level) = level {
            path.push_str(&format!("&level={level}"));
        }
        self.get_json(&path).await
    }

    pub async fn shutdown(&self) -> Result<Value> {
        Ok(self.post_json("/api/exit", None).await?.1)
    }

    /// Tail the live event stream, printing each event as a JSON line.
    pub async fn watch(&self) -> Result<()> {
        let request = self.http.get(self.url("/events"));
        let mut source = EventSource::new(request)?;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => info!("Connected to event stream"),
                Ok(Event::Message(message)) => println!("{}", message.data),
                Err(e) => {
                    source.close();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}
