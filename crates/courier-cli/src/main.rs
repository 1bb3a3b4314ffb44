//! Courier CLI
//!
//! Operator interface for the broker: submit test requests, inspect
//! status, history, and logs, tail the live event stream, and trigger
//! shutdown.

// This binary's whole job is printing to stdout.
#![allow(clippy::print_stdout)]

mod client;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use client::BrokerClient;

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about = "Courier broker CLI", long_about = None)]
struct Cli {
    /// Broker base URL
    #[arg(
        long,
        default_value = "http://127.0.0.1:54321",
        env = "COURIER_BROKER_URL"
    )]
    broker_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show broker status
    Status,
    /// Submit a request and print the response
    Submit {
        /// JSON payload; read from stdin when omitted
        payload: Option<String>,
    },
    /// Inspect request history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show recent broker log entries
    Logs {
        /// Filter by level (e.g. INFO, WARNING)
        #[arg(long)]
        level: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Tail the live event stream, one JSON event per line
    Watch,
    /// Shut the broker down
    Shutdown,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List recent records
    List,
    /// Show one record by correlation id
    Show { id: String },
    /// Export the history document
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Clear all records
    Clear,
    /// Persist the current history to disk
    Save,
    /// Reload history from disk
    Load,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    courier_core::tracing_init::init_stderr_tracing("courier=warn");

    let client = BrokerClient::new(cli.broker_url);

    match cli.command {
        Command::Status => print_json(&client.status().await?)?,
        Command::Submit { payload } => {
            let payload = read_payload(payload)?;
            let (status, body) = client.submit(&payload).await?;
            print_json(&body)?;
            if !status.is_success() {
                bail!("request failed with status {status}");
            }
        }
        Command::History { action } => run_history(&client, action).await?,
        Command::Logs { level, limit } => {
            print_json(&client.logs(level.as_deref(), limit).await?)?;
        }
        Command::Watch => client.watch().await?,
        Command::Shutdown => print_json(&client.shutdown().await?)?,
    }

    Ok(())
}

async fn run_history(client: &BrokerClient, action: HistoryAction) -> anyhow::Result<()> {
    match action {
        HistoryAction::List => print_json(&client.history().await?)?,
        HistoryAction::Show { id } => print_json(&client.history_record(&id).await?)?,
        HistoryAction::Export { output } => {
            let document = client.export().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported history to {}", path.display());
                }
                None => println!("{document}"),
            }
        }
        HistoryAction::Clear => print_json(&client.clear_history().await?)?,
        HistoryAction::Save => {
            let (status, body) = client.save_history().await?;
            print_json(&body)?;
            if !status.is_success() {
                bail!("save failed with status {status}");
            }
        }
        HistoryAction::Load => {
            let (status, body) = client.load_history().await?;
            print_json(&body)?;
            if !status.is_success() {
                bail!("load failed with status {status}");
            }
        }
    }
    Ok(())
}

/// Parse the payload argument, falling back to stdin.
fn read_payload(arg: Option<String>) -> anyhow::Result<Value> {
    let raw = match arg {
        Some(raw) => raw,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read payload from stdin")?;
            buffer
        }
    };
    serde_json::from_str(raw.trim()).context("Payload is not valid JSON")
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_subcommand() {
        let cli = Cli::try_parse_from(["courier", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.broker_url, "http://127.0.0.1:54321");
    }

    #[test]
    fn parses_submit_with_inline_payload() {
        let cli =
            Cli::try_parse_from(["courier", "submit", r#"{"label":"ping"}"#]).unwrap();
        match cli.command {
            Command::Submit { payload } => {
                assert_eq!(payload.as_deref(), Some(r#"{"label":"ping"}"#));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn parses_history_show() {
        let cli = Cli::try_parse_from(["courier", "history", "show", "abc-123"]).unwrap();
        match cli.command {
            Command::History {
                action: HistoryAction::Show { id },
            } => assert_eq!(id, "abc-123"),
            _ => panic!("expected history show"),
        }
    }

    #[test]
    fn broker_url_flag_overrides_default() {
        let cli = Cli::try_parse_from([
            "courier",
            "--broker-url",
            "http://10.0.0.2:9000",
            "status",
        ])
        .unwrap();
        assert_eq!(cli.broker_url, "http://10.0.0.2:9000");
    }

    #[test]
    fn read_payload_rejects_invalid_json() {
        assert!(read_payload(Some("{broken".into())).is_err());
    }

    #[test]
    fn read_payload_parses_inline_json() {
        let value = read_payload(Some(r#"{"label": "ping"}"#.into())).unwrap();
        assert_eq!(value["label"], "ping");
    }
}
