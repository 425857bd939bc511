//! Example: track contract events from a JSON-RPC node and print each accepted log as JSON.
//!
//! Usage:
//!
//!   cargo run -p tracker --example event_tracker -- --config tracker.json --store events.json
//!
//! Options:
//!   --config <path>  Tracker config (JSON; see `TrackerConfig::from_json_str`). Required.
//!   --store <path>   Store file for the watermark and logs. Default: `tracker-store.json`.
//!
//! Stop with Ctrl-C; a restart resumes from the stored watermark.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracker::{EventTracker, HttpBlockProvider, JsonFileStore, Log, TrackerConfig, TrackerState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = String::new();
    let mut store_path = String::from("tracker-store.json");
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = args.get(i).cloned().unwrap_or_default();
            }
            "--store" => {
                i += 1;
                if let Some(p) = args.get(i) {
                    store_path = p.clone();
                }
            }
            "--help" | "-h" => {
                eprintln!("Usage: event_tracker --config <path> [--store <path>]");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }
    if config_path.is_empty() {
        eprintln!("Usage: event_tracker --config <path> [--store <path>]");
        std::process::exit(1);
    }

    let config = TrackerConfig::from_json_file(&config_path)
        .with_context(|| format!("load config {}", config_path))?;
    let provider = Arc::new(HttpBlockProvider::new(config.rpc_endpoint.clone())?);
    let store = Arc::new(JsonFileStore::open(&store_path).await?);
    let (tx, mut rx) = broadcast::channel::<Log>(1024);
    let tracker = EventTracker::new(config, provider, store, Arc::new(tx)).await?;
    tracker.start();

    let mut state = tracker.state();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(log) => println!("{}", serde_json::to_string(&log)?),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "printer lagged behind tracker");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracker.stop();
                state.wait_for(|s| *s == TrackerState::Stopped).await?;
                break;
            }
        }
    }
    Ok(())
}
