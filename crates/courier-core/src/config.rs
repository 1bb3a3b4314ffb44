//! Broker configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON config file,
//! then CLI arguments (applied by the binary, highest priority).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// HTTP transport bind address.
    pub http_addr: SocketAddr,
    /// Raw socket transport bind address.
    pub socket_addr: SocketAddr,
    /// Producer deadline: how long `submit` blocks for a response.
    pub request_timeout_secs: u64,
    /// Long-poll wait before answering an empty poll.
    pub poll_timeout_ms: u64,
    /// Consumer considered disconnected after this much inactivity.
    pub liveness_timeout_secs: u64,
    /// Interval between liveness recomputations.
    pub liveness_sweep_ms: u64,
    /// Socket session outbound delivery tick.
    pub delivery_interval_ms: u64,
    /// History ring buffer capacity.
    pub history_capacity: usize,
    /// Log ring buffer capacity.
    pub log_capacity: usize,
    /// Event bus channel capacity per observer.
    pub event_capacity: usize,
    /// Persist history after each recorded request.
    pub autosave: bool,
    /// History document path. `None` disables persistence.
    pub history_path: Option<PathBuf>,
    /// Delay between answering the exit request and terminating.
    pub shutdown_grace_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_addr(54321),
            socket_addr: default_addr(54322),
            request_timeout_secs: 30,
            poll_timeout_ms: 500,
            liveness_timeout_secs: 5,
            liveness_sweep_ms: 2000,
            delivery_interval_ms: 100,
            history_capacity: 100,
            log_capacity: 500,
            event_capacity: 256,
            autosave: true,
            history_path: default_history_path(),
            shutdown_grace_ms: 500,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn liveness_sweep(&self) -> Duration {
        Duration::from_millis(self.liveness_sweep_ms)
    }

    pub fn delivery_interval(&self) -> Duration {
        Duration::from_millis(self.delivery_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Default history document path: ~/.courier/history.json
pub fn default_history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".courier").join("history.json"))
}
