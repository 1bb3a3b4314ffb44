//! Live event stream endpoint (server-sent events).
//!
//! Bridges the broadcast bus into an SSE response. Observers that lag
//! simply miss events; a disconnected observer is dropped by the channel.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::events::BrokerEvent;

use super::AppState;

pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let broker = &state.broker;
    broker.refresh_liveness().await;
    broker.log("DEBUG", "Event stream observer connected").await;

    // Subscribe before taking the snapshot so no transition is lost in
    // between.
    let rx = broker.events.subscribe();
    let initial = BrokerEvent::status_update(broker.liveness.is_connected().await);

    let first = tokio_stream::iter(
        Event::default()
            .json_data(&initial)
            .ok()
            .map(Ok::<_, Infallible>),
    );
    let live = BroadcastStream::new(rx).filter_map(|item| {
        // Lagged observers miss events rather than stalling the bus
        let event = item.ok()?;
        Event::default()
            .json_data(&event)
            .ok()
            .map(Ok::<_, Infallible>)
    });

    Sse::new(first.chain(live)).keep_alive(KeepAlive::default())
}
