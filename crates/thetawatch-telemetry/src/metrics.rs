//! Prometheus metrics for the thetawatch risk engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error that must surface at
//! startup. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, register_int_gauge, Counter, CounterVec, Encoder, Gauge, GaugeVec,
    Histogram, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Market feed connection state (1 = connected).
pub static FEED_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "thetawatch_feed_connected",
        "Market feed connection state (1=connected)"
    )
    .unwrap()
});

/// Ticks by outcome.
/// Labels: outcome (received/processed/ignored/coalesced/dropped)
pub static TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "thetawatch_ticks_total",
        "Market ticks by processing outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Greeks cache lookups.
/// Labels: result (hit/miss)
pub static GREEKS_CACHE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "thetawatch_greeks_cache_total",
        "Greeks cache lookups by result",
        &["result"]
    )
    .unwrap()
});

/// Rejected pricing inputs per symbol.
pub static CALCULATION_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "thetawatch_calculation_failures_total",
        "Legs skipped because of invalid pricing inputs",
        &["symbol"]
    )
    .unwrap()
});

/// Position Greeks computation latency in seconds.
pub static RECOMPUTE_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "thetawatch_recompute_latency_seconds",
        "Position Greeks computation latency",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    )
    .unwrap()
});

/// Portfolio Greeks.
/// Labels: greek (delta/gamma/theta/vega/rho)
pub static PORTFOLIO_GREEKS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "thetawatch_portfolio_greeks",
        "Aggregated portfolio Greeks",
        &["greek"]
    )
    .unwrap()
});

/// Portfolio risk score (0-100, higher is safer).
pub static PORTFOLIO_RISK_SCORE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "thetawatch_portfolio_risk_score",
        "Portfolio risk score (0-100)"
    )
    .unwrap()
});

/// Subscribed positions.
pub static SUBSCRIBED_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "thetawatch_subscribed_positions",
        "Number of subscribed positions"
    )
    .unwrap()
});

/// Symbols without a tick inside the staleness window.
pub static STALE_SYMBOLS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "thetawatch_stale_symbols",
        "Symbols without a recent tick"
    )
    .unwrap()
});

/// Alerts raised.
/// Labels: alert_type, severity
pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "thetawatch_alerts_total",
        "Threshold alerts raised",
        &["alert_type", "severity"]
    )
    .unwrap()
});

/// Observer callback failures.
/// Labels: registry
pub static OBSERVER_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "thetawatch_observer_failures_total",
        "Observer callbacks that returned an error or panicked",
        &["registry"]
    )
    .unwrap()
});

/// Emergency stop state (1 = tripped).
pub static EMERGENCY_STOP: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "thetawatch_emergency_stop",
        "Emergency stop latch state (1=tripped)"
    )
    .unwrap()
});

/// Threshold evaluation cycles.
pub static EVALUATIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "thetawatch_evaluations_total",
        "Threshold evaluation cycles"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Feed
    // =========================================================================

    pub fn feed_connected() {
        FEED_CONNECTED.set(1.0);
    }

    pub fn feed_disconnected() {
        FEED_CONNECTED.set(0.0);
    }

    /// Record a tick outcome.
    pub fn tick(outcome: &str) {
        TICKS_TOTAL.with_label_values(&[outcome]).inc();
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    pub fn cache_hit() {
        GREEKS_CACHE_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn cache_miss() {
        GREEKS_CACHE_TOTAL.with_label_values(&["miss"]).inc();
    }

    /// Record a leg rejected by the pricing adapter.
    pub fn calculation_failed(symbol: &str) {
        CALCULATION_FAILURES_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn recompute_latency(seconds: f64) {
        RECOMPUTE_LATENCY_SECONDS.observe(seconds);
    }

    /// Publish portfolio Greeks and risk score.
    pub fn portfolio(delta: f64, gamma: f64, theta: f64, vega: f64, rho: f64, risk_score: f64) {
        for (greek, value) in [
            ("delta", delta),
            ("gamma", gamma),
            ("theta", theta),
            ("vega", vega),
            ("rho", rho),
        ] {
            PORTFOLIO_GREEKS.with_label_values(&[greek]).set(value);
        }
        PORTFOLIO_RISK_SCORE.set(risk_score);
    }

    pub fn subscribed_positions(count: usize) {
        SUBSCRIBED_POSITIONS.set(count as i64);
    }

    pub fn stale_symbols(count: usize) {
        STALE_SYMBOLS.set(count as i64);
    }

    // =========================================================================
    // Risk
    // =========================================================================

    pub fn alert_raised(alert_type: &str, severity: &str) {
        ALERTS_TOTAL
            .with_label_values(&[alert_type, severity])
            .inc();
    }

    /// Record failed observer deliveries.
    pub fn observer_failures(registry: &str, count: usize) {
        if count > 0 {
            OBSERVER_FAILURES_TOTAL
                .with_label_values(&[registry])
                .inc_by(count as f64);
        }
    }

    pub fn emergency_stop(tripped: bool) {
        EMERGENCY_STOP.set(if tripped { 1.0 } else { 0.0 });
    }

    pub fn evaluation_cycle() {
        EVALUATIONS_TOTAL.inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
