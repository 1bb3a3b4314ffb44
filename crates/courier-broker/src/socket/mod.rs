//! Raw socket transport: a persistent duplex connection to the consumer.
//!
//! Frames are newline-delimited JSON in both directions. At most one
//! session is authoritative at a time; a new incoming connection supersedes
//! the previous one (last-writer-wins). The session loop interleaves
//! framed reads with a fixed-interval outbound delivery tick so the write
//! side never starves the read side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use courier_core::envelope::{InboundFrame, parse_frame};

use crate::broker::Broker;

/// The socket-transport half of the relay.
pub struct SocketRelay {
    broker: Arc<Broker>,
}

impl SocketRelay {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Accept consumer connections until shutdown. Each accepted connection
    /// becomes the authoritative session, retiring the previous one.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let mut active: Option<watch::Sender<bool>> = None;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Some(previous) = active.take() {
                            let _ = previous.send(true);
                        }
                        let (retire_tx, retire_rx) = watch::channel(false);
                        active = Some(retire_tx);

                        let broker = Arc::clone(&self.broker);
                        let session_shutdown = shutdown.clone();
                        tokio::spawn(run_session(
                            broker,
                            stream,
                            peer,
                            retire_rx,
                            session_shutdown,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Socket accept failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
                _ = shutdown.changed() => {
                    debug!("Socket relay shutting down");
                    return;
                }
            }
        }
    }
}

/// One authoritative consumer session.
async fn run_session(
    broker: Arc<Broker>,
    stream: TcpStream,
    peer: SocketAddr,
    mut retire: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    broker
        .log("INFO", &format!("Socket consumer connected from {peer}"))
        .await;
    broker.note_consumer_activity().await;

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut delivery = tokio::time::interval(broker.config.delivery_interval());
    delivery.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    broker.note_consumer_activity().await;
                    handle_frame(&broker, &line).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Socket read error");
                    break;
                }
            },
            _ = delivery.tick() => {
                // An open session counts as consumer activity
                broker.note_consumer_activity().await;
                if let Err(e) = deliver_next(&broker, &mut writer).await {
                    broker
                        .log("ERROR", &format!("Failed to deliver via socket: {e}"))
                        .await;
                    break;
                }
            },
            _ = retire.changed() => {
                broker
                    .log("INFO", "Socket session superseded by a new connection")
                    .await;
                return;
            }
            _ = shutdown.changed() => return,
        }
    }

    broker.log("INFO", "Socket consumer disconnected").await;
}

/// Handle one inbound frame. Malformed frames are dropped with a warning
/// and the connection stays open; frames without a correlation id are
/// logged and discarded.
async fn handle_frame(broker: &Broker, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match parse_frame(line) {
        Ok(InboundFrame {
            id: Some(id),
            payload,
        }) => {
            // Unknown ids are logged and discarded inside resolve
            let _ = broker.resolve(&id, payload).await;
        }
        Ok(InboundFrame { id: None, .. }) => {
            broker
                .log("WARNING", "Socket frame missing correlation id")
                .await;
        }
        Err(e) => {
            broker
                .log("WARNING", &format!("Invalid frame from socket: {e}"))
                .await;
        }
    }
}

/// Pop one queued entry, if any, and write it as a newline-terminated
/// frame. A failed write restores the entry to the head of the queue
/// before the error tears the session down, so no request is lost.
async fn deliver_next<W>(broker: &Broker, writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(entry) = broker.queue.try_pop().await else {
        return Ok(());
    };
    let mut line = match entry.to_frame() {
        Ok(line) => line,
        Err(e) => {
            error!(id = %entry.id, error = %e, "Failed to serialize outbound frame");
            return Ok(());
        }
    };
    line.push('\n');

    if let Err(e) = writer.write_all(line.as_bytes()).await {
        broker.queue.push_front(entry).await;
        return Err(e);
    }
    debug!(id = %entry.id, "Delivered request via socket");
    Ok(())
}
