//! Pending request registry: the correlation core.
//!
//! Tracks in-flight requests by correlation id and blocks each producer
//! until its own response arrives or its deadline elapses. Exactly one of
//! those outcomes occurs per request; the entry is removed from the map on
//! either transition.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, oneshot};
use tracing::debug;

/// Terminal outcome of a blocking wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The consumer resolved the request before the deadline.
    Resolved(Value),
    /// The deadline elapsed; the entry has been purged.
    TimedOut,
}

/// Registry of in-flight requests keyed by correlation id.
///
/// An id is present in the map exactly while its request is unresolved:
/// `resolve` removes it when firing the completion signal, and an expired
/// `wait` removes it when purging. Resolutions for absent ids are rejected.
pub struct RequestRegistry {
    pending: RwLock<HashMap<String, oneshot::Sender<Value>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh correlation id and register a pending entry for it.
    ///
    /// Returns the id and the receiver half of the completion signal, to be
    /// passed to [`RequestRegistry::wait`].
    pub async fn insert(&self) -> (String, oneshot::Receiver<Value>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(id.clone(), tx);
        debug!(request_id = %id, "Registered pending request");
        (id, rx)
    }

    /// Block until the request is resolved or `deadline` elapses.
    ///
    /// On expiry the entry is atomically removed; a resolution that already
    /// won the removal race has its payload buffered in the channel and is
    /// returned as a success, so each request still sees exactly one outcome.
    pub async fn wait(
        &self,
        id: &str,
        mut rx: oneshot::Receiver<Value>,
        deadline: Duration,
    ) -> WaitOutcome {
        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(payload)) => WaitOutcome::Resolved(payload),
            Ok(Err(_)) => WaitOutcome::TimedOut,
            Err(_) => {
                if self.pending.write().await.remove(id).is_some() {
                    debug!(request_id = %id, "Purged expired request");
                    return WaitOutcome::TimedOut;
                }
                match rx.try_recv() {
                    Ok(payload) => WaitOutcome::Resolved(payload),
                    Err(_) => WaitOutcome::TimedOut,
                }
            }
        }
    }

    /// Resolve a pending request, unblocking its waiter.
    ///
    /// Returns `false` if `id` is not currently pending (already resolved,
    /// expired, or never issued); the caller logs and discards the payload.
    pub async fn resolve(&self, id: &str, payload: Value) -> bool {
        let Some(tx) = self.pending.write().await.remove(id) else {
            return false;
        };
        if tx.send(payload).is_err() {
            // Waiter gave up between deadline expiry and purge; the entry
            // was still pending, so the resolution itself counts.
            debug!(request_id = %id, "Waiter gone before resolution arrived");
        }
        true
    }

    /// Number of requests currently awaiting resolution.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
