//! Threshold monitor.
//!
//! Compares published Greeks snapshots against warning/critical bands and
//! raises one alert per breach at the more severe level. Evaluation runs on
//! its own cadence, so alerts are produced once per cycle and never per tick.
//!
//! Breach rules:
//! - delta, gamma, vega: absolute value at or above the level
//! - theta: value at or below the level (more negative means more decay)
//! - risk score: value at or below the level (portfolio only)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thetawatch_core::{GreeksSnapshot, ObserverId, ObserverRegistry, ObserverResult, PortfolioSnapshot};
use thetawatch_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::alert::{Alert, AlertLog, AlertSeverity, AlertType};
use crate::emergency_stop::{EmergencyStop, StopReason};
use crate::error::{RiskError, RiskResult};

// ============================================================================
// Configuration
// ============================================================================

/// A warning/critical pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub warning: f64,
    pub critical: f64,
}

impl Band {
    #[must_use]
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

/// How a value is compared against its band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachRule {
    /// `|value| >= level`.
    Magnitude,
    /// `value <= level`.
    AtOrBelow,
}

impl BreachRule {
    fn breached(self, value: f64, level: f64) -> bool {
        match self {
            Self::Magnitude => value.abs() >= level,
            Self::AtOrBelow => value <= level,
        }
    }

    fn validate(self, metric: &str, band: &Band) -> RiskResult<()> {
        let invalid = |reason: &str| RiskError::InvalidBand {
            metric: metric.to_string(),
            reason: reason.to_string(),
        };

        if !band.warning.is_finite() || !band.critical.is_finite() {
            return Err(invalid("levels must be finite"));
        }
        match self {
            Self::Magnitude => {
                if band.warning <= 0.0 {
                    return Err(invalid("warning must be positive"));
                }
                if band.critical < band.warning {
                    return Err(invalid("critical must be at or above warning"));
                }
            }
            Self::AtOrBelow => {
                if band.critical > band.warning {
                    return Err(invalid("critical must be at or below warning"));
                }
            }
        }
        Ok(())
    }
}

/// Classify `value` against `band`. Critical wins over warning.
#[must_use]
pub fn classify(value: f64, band: &Band, rule: BreachRule) -> Option<(AlertSeverity, f64)> {
    if rule.breached(value, band.critical) {
        Some((AlertSeverity::Critical, band.critical))
    } else if rule.breached(value, band.warning) {
        Some((AlertSeverity::Warning, band.warning))
    } else {
        None
    }
}

/// Bands for the four Greeks at one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreekBands {
    pub delta: Band,
    pub gamma: Band,
    /// Daily dollar theta. Levels are negative.
    pub theta: Band,
    pub vega: Band,
}

impl GreekBands {
    fn validate(&self, scope: &str) -> RiskResult<()> {
        BreachRule::Magnitude.validate(&format!("{scope}.delta"), &self.delta)?;
        BreachRule::Magnitude.validate(&format!("{scope}.gamma"), &self.gamma)?;
        BreachRule::AtOrBelow.validate(&format!("{scope}.theta"), &self.theta)?;
        BreachRule::Magnitude.validate(&format!("{scope}.vega"), &self.vega)?;
        Ok(())
    }
}

/// Threshold monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Per-position bands.
    #[serde(default = "default_position_bands")]
    pub position: GreekBands,
    /// Portfolio bands.
    #[serde(default = "default_portfolio_bands")]
    pub portfolio: GreekBands,
    /// Portfolio risk score band (lower is worse).
    #[serde(default = "default_risk_score_band")]
    pub risk_score: Band,
    /// Maximum alerts kept in the log.
    #[serde(default = "default_alert_log_max")]
    pub alert_log_max: usize,
    /// Trip the emergency stop on a critical risk score.
    #[serde(default = "default_trigger_emergency_stop")]
    pub trigger_emergency_stop_on_critical: bool,
}

fn default_position_bands() -> GreekBands {
    GreekBands {
        delta: Band::new(50.0, 100.0),
        gamma: Band::new(20.0, 50.0),
        theta: Band::new(-50.0, -100.0),
        vega: Band::new(100.0, 250.0),
    }
}

fn default_portfolio_bands() -> GreekBands {
    GreekBands {
        delta: Band::new(100.0, 200.0),
        gamma: Band::new(50.0, 100.0),
        theta: Band::new(-200.0, -500.0),
        vega: Band::new(500.0, 1000.0),
    }
}

fn default_risk_score_band() -> Band {
    Band::new(50.0, 30.0)
}

fn default_alert_log_max() -> usize {
    1000
}

fn default_trigger_emergency_stop() -> bool {
    true
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            position: default_position_bands(),
            portfolio: default_portfolio_bands(),
            risk_score: default_risk_score_band(),
            alert_log_max: default_alert_log_max(),
            trigger_emergency_stop_on_critical: default_trigger_emergency_stop(),
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> RiskResult<()> {
        self.position.validate("position")?;
        self.portfolio.validate("portfolio")?;
        BreachRule::AtOrBelow.validate("risk_score", &self.risk_score)?;
        if !(0.0..=100.0).contains(&self.risk_score.critical)
            || !(0.0..=100.0).contains(&self.risk_score.warning)
        {
            return Err(RiskError::InvalidBand {
                metric: "risk_score".to_string(),
                reason: "levels must be within 0..=100".to_string(),
            });
        }
        if self.alert_log_max == 0 {
            return Err(RiskError::Config("alert_log_max must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// ThresholdMonitor
// ============================================================================

/// Evaluates snapshots against the configured bands and fans alerts out to
/// registered callbacks.
pub struct ThresholdMonitor {
    config: ThresholdConfig,
    log: RwLock<AlertLog>,
    observers: ObserverRegistry<Alert>,
    stop: Arc<EmergencyStop>,
    last_evaluated: RwLock<Option<DateTime<Utc>>>,
}

impl ThresholdMonitor {
    /// Build a monitor. The config is validated here, not at evaluation time.
    pub fn new(config: ThresholdConfig, stop: Arc<EmergencyStop>) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            log: RwLock::new(AlertLog::new(config.alert_log_max)),
            observers: ObserverRegistry::new("alerts"),
            config,
            stop,
            last_evaluated: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Register an alert callback.
    pub fn register_callback<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&Alert) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.register(callback)
    }

    pub fn unregister_callback(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Run one evaluation cycle.
    ///
    /// Every alert raised is logged, counted and delivered to callbacks
    /// before this returns.
    pub fn evaluate(
        &self,
        positions: &[GreeksSnapshot],
        portfolio: &PortfolioSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for snapshot in positions {
            Self::check_greeks(
                &mut alerts,
                &self.config.position,
                Some(&snapshot.symbol),
                [snapshot.delta, snapshot.gamma, snapshot.theta, snapshot.vega],
                now,
            );
        }

        Self::check_greeks(
            &mut alerts,
            &self.config.portfolio,
            None,
            [portfolio.delta, portfolio.gamma, portfolio.theta, portfolio.vega],
            now,
        );

        if let Some((severity, level)) =
            classify(portfolio.risk_score, &self.config.risk_score, BreachRule::AtOrBelow)
        {
            alerts.push(Alert::new(
                AlertType::RiskScore,
                severity,
                None,
                portfolio.risk_score,
                level,
                now,
            ));

            if severity == AlertSeverity::Critical && self.config.trigger_emergency_stop_on_critical {
                self.stop.trip(StopReason::CriticalRiskScore {
                    score: portfolio.risk_score,
                    critical: level,
                });
            }
        }

        {
            let mut log = self.log.write();
            for alert in &alerts {
                log.push(alert.clone());
            }
        }
        *self.last_evaluated.write() = Some(now);
        Metrics::evaluation_cycle();

        for alert in &alerts {
            Metrics::alert_raised(alert.alert_type.as_str(), alert.severity.as_str());
            match alert.severity {
                AlertSeverity::Critical => warn!(
                    alert_type = %alert.alert_type,
                    symbol = alert.symbol.as_deref().unwrap_or("portfolio"),
                    value = alert.value,
                    threshold = alert.threshold,
                    "Critical threshold breached"
                ),
                AlertSeverity::Warning => info!(
                    alert_type = %alert.alert_type,
                    symbol = alert.symbol.as_deref().unwrap_or("portfolio"),
                    value = alert.value,
                    threshold = alert.threshold,
                    "Warning threshold breached"
                ),
            }

            let report = self.observers.notify(alert);
            if report.failed > 0 {
                Metrics::observer_failures("alerts", report.failed);
            }
        }

        debug!(
            positions = positions.len(),
            alerts = alerts.len(),
            "Threshold evaluation complete"
        );
        alerts
    }

    fn check_greeks(
        alerts: &mut Vec<Alert>,
        bands: &GreekBands,
        symbol: Option<&str>,
        [delta, gamma, theta, vega]: [f64; 4],
        now: DateTime<Utc>,
    ) {
        let checks = [
            (AlertType::Delta, delta, &bands.delta, BreachRule::Magnitude),
            (AlertType::Gamma, gamma, &bands.gamma, BreachRule::Magnitude),
            (AlertType::Theta, theta, &bands.theta, BreachRule::AtOrBelow),
            (AlertType::Vega, vega, &bands.vega, BreachRule::Magnitude),
        ];

        for (alert_type, value, band, rule) in checks {
            if let Some((severity, level)) = classify(value, band, rule) {
                alerts.push(Alert::new(
                    alert_type,
                    severity,
                    symbol.map(str::to_string),
                    value,
                    level,
                    now,
                ));
            }
        }
    }

    /// Logged alerts, oldest first, optionally filtered by type.
    #[must_use]
    pub fn current_alerts(&self, alert_type: Option<AlertType>) -> Vec<Alert> {
        self.log.read().alerts(alert_type)
    }

    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.log.read().len()
    }

    pub fn clear_alerts(&self) {
        self.log.write().clear();
    }

    #[must_use]
    pub fn last_evaluated(&self) -> Option<DateTime<Utc>> {
        *self.last_evaluated.read()
    }

    #[must_use]
    pub fn emergency_stop(&self) -> &Arc<EmergencyStop> {
        &self.stop
    }
}

impl std::fmt::Debug for ThresholdMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdMonitor")
            .field("alerts", &self.alert_count())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(symbol: &str, delta: f64, theta: f64) -> GreeksSnapshot {
        GreeksSnapshot {
            symbol: symbol.to_string(),
            delta,
            gamma: 1.0,
            theta,
            vega: 10.0,
            rho: 0.0,
            theoretical_value: 0.0,
            spot_price: 100.0,
            computed_at: Utc::now(),
            legs_priced: 1,
            legs_skipped: 0,
        }
    }

    fn monitor() -> ThresholdMonitor {
        ThresholdMonitor::new(ThresholdConfig::default(), Arc::new(EmergencyStop::new())).unwrap()
    }

    #[test]
    fn test_classify_critical_wins() {
        let band = Band::new(50.0, 100.0);
        assert_eq!(classify(40.0, &band, BreachRule::Magnitude), None);
        assert_eq!(
            classify(-60.0, &band, BreachRule::Magnitude),
            Some((AlertSeverity::Warning, 50.0))
        );
        assert_eq!(
            classify(150.0, &band, BreachRule::Magnitude),
            Some((AlertSeverity::Critical, 100.0))
        );
    }

    #[test]
    fn test_theta_compares_decay_not_magnitude() {
        let band = Band::new(-50.0, -100.0);
        // Large positive theta is income, never a breach.
        assert_eq!(classify(500.0, &band, BreachRule::AtOrBelow), None);
        assert_eq!(
            classify(-75.0, &band, BreachRule::AtOrBelow),
            Some((AlertSeverity::Warning, -50.0))
        );
        assert_eq!(
            classify(-120.0, &band, BreachRule::AtOrBelow),
            Some((AlertSeverity::Critical, -100.0))
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(ThresholdConfig::default().validate().is_ok());

        let mut bad = ThresholdConfig::default();
        bad.position.delta = Band::new(100.0, 50.0);
        assert!(matches!(bad.validate(), Err(RiskError::InvalidBand { .. })));

        let mut bad = ThresholdConfig::default();
        bad.portfolio.theta = Band::new(-500.0, -200.0);
        assert!(bad.validate().is_err());

        let mut bad = ThresholdConfig::default();
        bad.risk_score = Band::new(150.0, 30.0);
        assert!(bad.validate().is_err());

        let mut bad = ThresholdConfig::default();
        bad.alert_log_max = 0;
        assert!(matches!(bad.validate(), Err(RiskError::Config(_))));

        let mut bad = ThresholdConfig::default();
        bad.position.vega = Band::new(f64::NAN, 250.0);
        assert!(
            ThresholdMonitor::new(bad, Arc::new(EmergencyStop::new())).is_err()
        );
    }

    #[test]
    fn test_config_partial_toml() {
        let config: ThresholdConfig = toml::from_str(
            r#"
            alert_log_max = 200

            [risk_score]
            warning = 60.0
            critical = 40.0
            "#,
        )
        .unwrap();
        assert_eq!(config.alert_log_max, 200);
        assert_eq!(config.risk_score, Band::new(60.0, 40.0));
        assert_eq!(config.position.delta, Band::new(50.0, 100.0));
        assert!(config.trigger_emergency_stop_on_critical);
    }

    #[test]
    fn test_one_alert_per_breach_at_most_severe_level() {
        let monitor = monitor();
        let now = Utc::now();
        let positions = vec![snapshot("SPY", 150.0, -10.0), snapshot("QQQ", 10.0, -10.0)];
        let portfolio = PortfolioSnapshot::empty(now);

        let alerts = monitor.evaluate(&positions, &portfolio, now);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Delta);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].symbol.as_deref(), Some("SPY"));
        assert_eq!(monitor.alert_count(), 1);
        assert_eq!(monitor.last_evaluated(), Some(now));
    }

    #[test]
    fn test_portfolio_breaches_and_emergency_stop() {
        let stop = Arc::new(EmergencyStop::new());
        let monitor = ThresholdMonitor::new(ThresholdConfig::default(), stop.clone()).unwrap();
        let now = Utc::now();
        let mut portfolio = PortfolioSnapshot::empty(now);
        portfolio.theta = -600.0;
        portfolio.risk_score = 20.0;

        let alerts = monitor.evaluate(&[], &portfolio, now);

        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.is_portfolio()));
        assert_eq!(monitor.current_alerts(Some(AlertType::Theta)).len(), 1);
        assert_eq!(monitor.current_alerts(Some(AlertType::RiskScore)).len(), 1);
        assert!(stop.is_active());
    }

    #[test]
    fn test_warning_risk_score_does_not_trip() {
        let stop = Arc::new(EmergencyStop::new());
        let monitor = ThresholdMonitor::new(ThresholdConfig::default(), stop.clone()).unwrap();
        let now = Utc::now();
        let mut portfolio = PortfolioSnapshot::empty(now);
        portfolio.risk_score = 45.0;

        let alerts = monitor.evaluate(&[], &portfolio, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert!(!stop.is_active());
    }

    #[test]
    fn test_failing_callback_does_not_block_others() {
        let monitor = monitor();
        let delivered = Arc::new(AtomicUsize::new(0));

        monitor.register_callback(|_alert| Err("smtp down".into()));
        monitor.register_callback(|_alert| panic!("observer bug"));
        let counter = delivered.clone();
        let id = monitor.register_callback(move |_alert| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let now = Utc::now();
        let positions = vec![snapshot("SPY", 75.0, -75.0)];
        let alerts = monitor.evaluate(&positions, &PortfolioSnapshot::empty(now), now);

        assert_eq!(alerts.len(), 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);

        assert!(monitor.unregister_callback(id));
        monitor.evaluate(&positions, &PortfolioSnapshot::empty(now), now);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }
}
