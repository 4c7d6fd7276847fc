//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use thetawatch_core::{Leg, OptionType, Position, StrategyTag};
use thetawatch_engine::{AppConfig, RiskEngine};
use thetawatch_feed::{event_channel, FeedEvent, MockMarketFeed};
use thetawatch_greeks::BlackScholesCalculator;
use tokio::sync::mpsc;

/// Engine config with fast periodic tasks and a near-zero cache TTL.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.engine.evaluation_interval_ms = 50;
    config.engine.telemetry_interval_ms = 50;
    config.aggregator.cache_ttl_ms = 1;
    config
}

/// Engine wired to a mock feed.
pub struct Harness {
    pub engine: RiskEngine,
    pub feed: Arc<MockMarketFeed>,
    events: Option<mpsc::Receiver<FeedEvent>>,
}

impl Harness {
    pub fn new(config: AppConfig) -> Self {
        let (tx, rx) = event_channel(256);
        let feed = Arc::new(MockMarketFeed::new(tx));
        let engine = RiskEngine::new(
            config,
            Arc::new(BlackScholesCalculator::default()),
            feed.clone(),
        )
        .unwrap();
        Self {
            engine,
            feed,
            events: Some(rx),
        }
    }

    pub fn start(&mut self) {
        let events = self.events.take().expect("harness already started");
        self.engine.start(events).unwrap();
    }

    pub fn started(config: AppConfig) -> Self {
        let mut harness = Self::new(config);
        harness.start();
        harness
    }
}

pub fn days_out(days: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::days(days)
}

/// Last second of today (UTC): zero days to expiry.
pub fn end_of_today() -> DateTime<Utc> {
    let naive = Utc::now().date_naive().and_hms_opt(23, 59, 59).unwrap();
    Utc.from_utc_datetime(&naive)
}

/// One long call, 100 multiplier.
pub fn call_position(symbol: &str, strike: f64, expiration: DateTime<Utc>) -> Position {
    Position::new(
        symbol,
        None,
        vec![Leg::new(OptionType::Call, strike, expiration, 1)],
    )
}

/// Short put tagged as a long-duration position.
pub fn lt112_position(symbol: &str, strike: f64) -> Position {
    Position::new(
        symbol,
        Some(StrategyTag::Lt112),
        vec![Leg::new(OptionType::Put, strike, days_out(112), -1)],
    )
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
