//! Sietch event log replayer.

use anyhow::Context;
use clap::Parser;
use sietch_core::EventLog;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod summary;

use summary::Summary;

/// Replay a recorded game and report the resulting state
#[derive(Parser, Debug)]
#[command(name = "sietch-replay")]
#[command(about = "Replay a Sietch event log and report turn order and forces")]
struct Args {
    /// Path to a JSON event log
    log: PathBuf,

    /// Print a human-readable turn and force summary (default)
    #[arg(long, conflicts_with = "json")]
    summary: bool,

    /// Print the final game state as JSON
    #[arg(long)]
    json: bool,

    /// Only replay the first N events
    #[arg(long, value_name = "N")]
    until: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.log)
        .with_context(|| format!("reading {}", args.log.display()))?;
    let log = EventLog::from_json(&raw)
        .with_context(|| format!("parsing {}", args.log.display()))?;

    info!(game_id = %log.game_id, version = log.version, events = log.events.len(), "loaded log");

    let count = args.until.unwrap_or(log.events.len());
    let game = log
        .replay_until(count)
        .with_context(|| format!("replaying {}", args.log.display()))?;

    if args.json && !args.summary {
        println!("{}", serde_json::to_string_pretty(&game)?);
    } else {
        print!("{}", Summary::new(&log, &game));
    }

    Ok(())
}
