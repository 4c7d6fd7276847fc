//! thetawatch - real-time options portfolio risk engine.
//!
//! Reads positions from a JSON file and ticks from stdin (one JSON object
//! per line), and runs until Ctrl-C or end of input.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use thetawatch_core::Position;
use thetawatch_engine::{AppConfig, RiskEngine};
use thetawatch_feed::{event_channel, JsonLinesFeed};
use thetawatch_greeks::BlackScholesCalculator;
use tokio::io::BufReader;
use tracing::{info, warn};

/// Real-time options portfolio risk engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via THETAWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON file with an array of positions to track
    #[arg(short, long)]
    positions: Option<String>,
}

fn load_positions(path: &str) -> Result<Vec<Position>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    thetawatch_telemetry::init_logging()?;

    info!("Starting thetawatch v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;

    let positions = match args.positions.as_deref() {
        Some(path) => load_positions(path)?,
        None => Vec::new(),
    };

    let (events_tx, events_rx) = event_channel(config.engine.feed_channel_capacity);
    let feed = Arc::new(JsonLinesFeed::new(events_tx));
    let calculator = Arc::new(BlackScholesCalculator::new(config.aggregator.risk_free_rate));
    let engine = RiskEngine::new(config, calculator, feed.clone())?;

    for position in positions {
        let symbol = position.symbol.clone();
        if let Err(e) = engine.subscribe_position(position).await {
            warn!(symbol = %symbol, error = %e, "Skipping position");
        }
    }

    engine.start(events_rx)?;

    let reader = tokio::spawn(async move {
        feed.run(BufReader::new(tokio::io::stdin())).await
    });

    tokio::select! {
        result = reader => match result {
            Ok(Ok(forwarded)) => info!(forwarded, "End of tick input"),
            Ok(Err(e)) => warn!(error = %e, "Tick input failed"),
            Err(e) => warn!(error = %e, "Tick reader task failed"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    engine.stop().await;

    let status = engine.get_status();
    let portfolio = engine.get_portfolio_greeks();
    info!(
        positions = portfolio.position_count,
        delta = portfolio.delta,
        theta = portfolio.theta,
        risk_score = portfolio.risk_score,
        ticks = status.ticks_received,
        alerts = status.alert_count,
        "Final portfolio state"
    );
    Ok(())
}
