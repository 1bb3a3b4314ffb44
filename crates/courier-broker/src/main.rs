//! Courier broker daemon.
//!
//! Correlates asynchronous producer requests with out-of-band consumer
//! responses over two transports: HTTP long-polling and a persistent
//! newline-framed socket stream.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use courier_broker::broker::Broker;
use courier_broker::http::{self, AppState};
use courier_broker::socket::SocketRelay;
use courier_core::config::BrokerConfig;

#[derive(Parser, Debug)]
#[command(name = "courier-broker")]
#[command(version, about = "Courier broker - request/response relay daemon")]
struct Args {
    /// HTTP transport bind address
    #[arg(long, env = "COURIER_HTTP_ADDR")]
    http_addr: Option<SocketAddr>,

    /// Raw socket transport bind address
    #[arg(long, env = "COURIER_SOCKET_ADDR")]
    socket_addr: Option<SocketAddr>,

    /// JSON configuration file path
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// History document path (overrides config)
    #[arg(long, env = "COURIER_HISTORY_PATH")]
    history_path: Option<PathBuf>,

    /// Disable automatic history persistence
    #[arg(long, env = "COURIER_NO_AUTOSAVE")]
    no_autosave: bool,

    /// Producer request timeout in seconds
    #[arg(long, env = "COURIER_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Consumer liveness timeout in seconds
    #[arg(long, env = "COURIER_LIVENESS_TIMEOUT")]
    liveness_timeout: Option<u64>,

    /// Log level filter for the broker (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "COURIER_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "COURIER_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<BrokerConfig> {
        let mut config = match &self.config {
            Some(path) => BrokerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => BrokerConfig::default(),
        };
        if let Some(addr) = self.http_addr {
            config.http_addr = addr;
        }
        if let Some(addr) = self.socket_addr {
            config.socket_addr = addr;
        }
        if let Some(path) = self.history_path {
            config.history_path = Some(path);
        }
        if self.no_autosave {
            config.autosave = false;
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout_secs = secs;
        }
        if let Some(secs) = self.liveness_timeout {
            config.liveness_timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("courier_broker={}", args.log_level);
    let log_json = args.log_json;
    courier_core::tracing_init::init_tracing(&log_filter, log_json);

    let config = args.into_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        http = %config.http_addr,
        socket = %config.socket_addr,
        "Starting courier-broker"
    );

    let broker = Arc::new(Broker::new(config.clone()));

    // Load history from the previous session before accepting requests
    if let Some(path) = &config.history_path {
        match broker.stats.load_from(path).await {
            Ok(count) if count > 0 => {
                info!(count, path = %path.display(), "Loaded request history");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to load history"),
        }
    }

    // Daemon-level shutdown channel (triggered by the exit endpoint or Ctrl+C)
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Subscribe early, before passing shutdown_tx to any component, to avoid
    // a race where a component could send the signal before we subscribe.
    let mut daemon_shutdown_rx = shutdown_tx.subscribe();

    // Bind both transports up front so a port conflict fails fast with a
    // clear message instead of a half-started broker.
    let http_listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP transport on {}", config.http_addr))?;
    let socket_listener = TcpListener::bind(config.socket_addr)
        .await
        .with_context(|| format!("Failed to bind socket transport on {}", config.socket_addr))?;

    let relay = SocketRelay::new(Arc::clone(&broker));
    let socket_handle = tokio::spawn(relay.serve(socket_listener, shutdown_tx.subscribe()));

    let sweeper_handle = broker.spawn_liveness_sweeper(shutdown_tx.subscribe());

    let state = Arc::new(AppState {
        broker: Arc::clone(&broker),
        shutdown: shutdown_tx.clone(),
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the broker is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %config.http_addr, "HTTP transport ready");
    info!(addr = %config.socket_addr, "Socket transport ready");

    tokio::select! {
        result = http::serve(state, http_listener, shutdown_rx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
        _ = daemon_shutdown_rx.changed() => {
            info!("Shutdown requested via exit endpoint");
        }
    }

    // Signal the socket relay and liveness sweeper to shut down
    let _ = shutdown_tx.send(true);
    let _ = socket_handle.await;
    let _ = sweeper_handle.await;

    info!("Broker stopped");
    Ok(())
}
