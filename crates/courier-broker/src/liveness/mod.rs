//! Consumer liveness derived from observed activity.
//!
//! Two states, initial `disconnected`. Any observed consumer activity (a
//! poll call or socket traffic) refreshes the activity timestamp; a
//! recomputation compares it against the liveness timeout. Transitions are
//! reported only when the state actually flips, never on every check.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Connectivity state mutated only by the monitor.
#[derive(Debug, Clone, Copy)]
struct ConnectionState {
    last_activity: Option<Instant>,
    last_seen: Option<DateTime<Utc>>,
    connected: bool,
}

/// A state flip worth announcing to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Disconnected,
}

pub struct LivenessMonitor {
    state: Mutex<ConnectionState>,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ConnectionState {
                last_activity: None,
                last_seen: None,
                connected: false,
            }),
            timeout,
        }
    }

    /// Record observed consumer activity. Returns a transition if this
    /// activity flipped the state to connected.
    pub async fn touch(&self) -> Option<Transition> {
        let mut state = self.state.lock().await;
        state.last_activity = Some(Instant::now());
        state.last_seen = Some(Utc::now());
        if state.connected {
            None
        } else {
            state.connected = true;
            Some(Transition::Connected)
        }
    }

    /// Recompute connectivity from the recency of observed activity.
    /// Returns a transition only if the computed value differs from the
    /// current state.
    pub async fn check(&self) -> Option<Transition> {
        let mut state = self.state.lock().await;
        let now_connected = state
            .last_activity
            .is_some_and(|at| at.elapsed() < self.timeout);
        if now_connected == state.connected {
            return None;
        }
        state.connected = now_connected;
        Some(if now_connected {
            Transition::Connected
        } else {
            Transition::Disconnected
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Wall-clock timestamp of the most recent observed activity.
    pub async fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_seen
    }
}
