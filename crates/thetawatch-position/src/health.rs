//! Position health scoring.
//!
//! Scores are derived on demand from a position and its latest market
//! data; they are never stored as authoritative state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thetawatch_core::{GreeksSnapshot, Position, StrategyTag};

/// Market-derived inputs for scoring and exit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    /// Days to the nearest leg expiration.
    pub days_to_expiry: i64,
    /// P&L as a percentage of entry value (positive = profit).
    pub pnl_percent: f64,
}

impl PositionMetrics {
    #[must_use]
    pub fn new(days_to_expiry: i64, pnl_percent: f64) -> Self {
        Self {
            days_to_expiry,
            pnl_percent,
        }
    }

    /// Derive metrics from the latest snapshot. Without a snapshot the P&L
    /// is reported as 0.
    #[must_use]
    pub fn from_snapshot(
        position: &Position,
        snapshot: Option<&GreeksSnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        let pnl_percent = snapshot
            .map(|s| position.pnl_percent(s.theoretical_value))
            .unwrap_or(0.0);
        Self::new(position.days_to_expiry(now), pnl_percent)
    }
}

/// Health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthLevel {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else if score >= 40.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Poor => "POOR",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Recommended next step for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthAction {
    TakeProfit,
    Hold,
    Monitor,
    Adjust,
    Close,
}

/// Result of scoring one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub symbol: String,
    /// 0 (worst) to 100 (best).
    pub score: f64,
    pub level: HealthLevel,
    pub primary_action: HealthAction,
    pub take_profit: bool,
    pub warnings: Vec<String>,
}

/// Scoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// P&L % that flags the position for profit taking.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,

    /// P&L % that earns the partial-profit bonus.
    #[serde(default = "default_partial_profit_pct")]
    pub partial_profit_pct: f64,

    /// DTE at or below which positions enter the management window.
    #[serde(default = "default_management_dte")]
    pub management_dte: i64,

    /// Entry week at or after which an LT112 entry is late.
    #[serde(default = "default_late_entry_week")]
    pub late_entry_week: u8,

    /// Score ceiling for LT112 inside the management window without enough profit.
    #[serde(default = "default_lt112_window_cap")]
    pub lt112_window_cap: f64,

    /// Score ceiling for 0DTE positions.
    #[serde(default = "default_zero_dte_cap")]
    pub zero_dte_cap: f64,
}

fn default_take_profit_pct() -> f64 {
    50.0
}

fn default_partial_profit_pct() -> f64 {
    25.0
}

fn default_management_dte() -> i64 {
    21
}

fn default_late_entry_week() -> u8 {
    3
}

fn default_lt112_window_cap() -> f64 {
    50.0
}

fn default_zero_dte_cap() -> f64 {
    20.0
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            partial_profit_pct: default_partial_profit_pct(),
            management_dte: default_management_dte(),
            late_entry_week: default_late_entry_week(),
            lt112_window_cap: default_lt112_window_cap(),
            zero_dte_cap: default_zero_dte_cap(),
        }
    }
}

/// Deterministic position health scorer.
#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    config: HealthConfig,
}

impl HealthScorer {
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Score a position. The result is always within [0, 100].
    #[must_use]
    pub fn score(&self, position: &Position, metrics: &PositionMetrics) -> HealthScore {
        let cfg = &self.config;
        let dte = metrics.days_to_expiry;
        let pnl = metrics.pnl_percent;
        let mut score: f64 = 100.0;
        let mut warnings = Vec::new();
        let mut take_profit = false;

        // Time to expiry
        let dte_penalty = match dte {
            d if d <= 0 => 60.0,
            d if d <= 3 => 40.0,
            d if d <= 7 => 25.0,
            d if d <= cfg.management_dte => 10.0,
            _ => 0.0,
        };
        if dte_penalty > 0.0 {
            score -= dte_penalty;
            warnings.push(format!("{dte} DTE"));
        }

        // P&L
        if pnl >= cfg.take_profit_pct {
            score += 10.0;
            take_profit = true;
        } else if pnl >= cfg.partial_profit_pct {
            score += 5.0;
        } else if pnl <= -200.0 {
            score -= 50.0;
            warnings.push(format!("Loss {pnl:.0}% exceeds 2x credit"));
        } else if pnl <= -100.0 {
            score -= 30.0;
            warnings.push(format!("Loss {pnl:.0}% exceeds credit"));
        } else if pnl <= -50.0 {
            score -= 15.0;
            warnings.push(format!("Loss {pnl:.0}%"));
        }

        // Strategy specific
        if position.strategy == Some(StrategyTag::Lt112) {
            if let Some(week) = position.entry.entry_week {
                if week >= cfg.late_entry_week {
                    score -= 15.0;
                    warnings.push(format!("LT112 entered late (week {week})"));
                }
            }
            if dte <= cfg.management_dte {
                if pnl < cfg.partial_profit_pct {
                    score = score.min(cfg.lt112_window_cap);
                    warnings.push(format!(
                        "LT112 inside {} DTE without {:.0}% profit",
                        cfg.management_dte, cfg.partial_profit_pct
                    ));
                } else {
                    score += 5.0;
                }
            }
        }

        let two_sided = position.strategy.map(|s| s.is_two_sided()).unwrap_or(false);
        if two_sided {
            if let Some(side) = position.entry.tested_side {
                score -= 25.0;
                warnings.push(format!("{side:?} side tested"));
            }
        }

        let mut score = score.clamp(0.0, 100.0);
        if dte <= 0 || position.strategy == Some(StrategyTag::ZeroDte) {
            score = score.min(cfg.zero_dte_cap);
        }

        let level = HealthLevel::from_score(score);
        let primary_action = if take_profit {
            HealthAction::TakeProfit
        } else {
            match level {
                HealthLevel::Excellent | HealthLevel::Good => HealthAction::Hold,
                HealthLevel::Fair => HealthAction::Monitor,
                HealthLevel::Poor => HealthAction::Adjust,
                HealthLevel::Critical => HealthAction::Close,
            }
        };

        HealthScore {
            symbol: position.symbol.clone(),
            score,
            level,
            primary_action,
            take_profit,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use thetawatch_core::{EntryMetadata, Leg, OptionType, TestedSide};

    fn position(strategy: Option<StrategyTag>, entry: EntryMetadata) -> Position {
        let expiry = Utc::now() + Duration::days(60);
        Position::new(
            "SPY",
            strategy,
            vec![
                Leg::new(OptionType::Put, 400.0, expiry, -1),
                Leg::new(OptionType::Call, 500.0, expiry, -1),
            ],
        )
        .with_entry(entry)
    }

    fn scorer() -> HealthScorer {
        HealthScorer::default()
    }

    #[test]
    fn test_healthy_position() {
        let pos = position(Some(StrategyTag::Strangle), EntryMetadata::default());
        let health = scorer().score(&pos, &PositionMetrics::new(45, 10.0));
        assert!((health.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(health.level, HealthLevel::Excellent);
        assert_eq!(health.primary_action, HealthAction::Hold);
        assert!(health.warnings.is_empty());
    }

    #[test]
    fn test_dte_penalties() {
        let pos = position(None, EntryMetadata::default());
        let s = scorer();
        assert!((s.score(&pos, &PositionMetrics::new(3, 0.0)).score - 60.0).abs() < 1e-9);
        assert!((s.score(&pos, &PositionMetrics::new(7, 0.0)).score - 75.0).abs() < 1e-9);
        assert!((s.score(&pos, &PositionMetrics::new(21, 0.0)).score - 90.0).abs() < 1e-9);
        assert!((s.score(&pos, &PositionMetrics::new(22, 0.0)).score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dte_is_capped_regardless_of_profit() {
        let pos = position(Some(StrategyTag::Strangle), EntryMetadata::default());
        for pnl in [-300.0, 0.0, 60.0, 500.0] {
            let health = scorer().score(&pos, &PositionMetrics::new(0, pnl));
            assert!(health.score <= 20.0, "pnl {pnl} scored {}", health.score);
            assert!(health.score >= 0.0);
        }
    }

    #[test]
    fn test_zero_dte_strategy_cap() {
        let pos = position(Some(StrategyTag::ZeroDte), EntryMetadata::default());
        let health = scorer().score(&pos, &PositionMetrics::new(5, 30.0));
        assert!((health.score - 20.0).abs() < f64::EPSILON);
        assert_eq!(health.level, HealthLevel::Critical);
    }

    #[test]
    fn test_take_profit_flag_drives_action() {
        let pos = position(None, EntryMetadata::default());
        let health = scorer().score(&pos, &PositionMetrics::new(10, 55.0));
        assert!(health.take_profit);
        assert_eq!(health.primary_action, HealthAction::TakeProfit);
        // 100 - 10 (<=21 DTE) + 10, clamped
        assert!((health.score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_loss_bands() {
        let pos = position(None, EntryMetadata::default());
        let s = scorer();
        assert!((s.score(&pos, &PositionMetrics::new(45, -60.0)).score - 85.0).abs() < 1e-9);
        assert!((s.score(&pos, &PositionMetrics::new(45, -150.0)).score - 70.0).abs() < 1e-9);
        let worst = s.score(&pos, &PositionMetrics::new(2, -250.0));
        assert!((worst.score - 10.0).abs() < 1e-9);
        assert_eq!(worst.primary_action, HealthAction::Close);
    }

    #[test]
    fn test_lt112_late_entry_and_window_cap() {
        let entry = EntryMetadata {
            entry_week: Some(4),
            ..Default::default()
        };
        let pos = position(Some(StrategyTag::Lt112), entry);
        let s = scorer();

        let early = s.score(&pos, &PositionMetrics::new(60, 0.0));
        assert!((early.score - 85.0).abs() < 1e-9);

        let in_window = s.score(&pos, &PositionMetrics::new(18, 10.0));
        assert!((in_window.score - 50.0).abs() < 1e-9);
        assert_eq!(in_window.level, HealthLevel::Poor);

        let profitable = s.score(&pos, &PositionMetrics::new(18, 30.0));
        // 100 - 10 + 5 - 15 + 5
        assert!((profitable.score - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_tested_side_on_two_sided_strategy() {
        let entry = EntryMetadata {
            tested_side: Some(TestedSide::Put),
            ..Default::default()
        };
        let condor = position(Some(StrategyTag::IronCondor), entry.clone());
        let health = scorer().score(&condor, &PositionMetrics::new(45, 0.0));
        assert!((health.score - 75.0).abs() < 1e-9);

        let other = position(Some(StrategyTag::Other), entry);
        let health = scorer().score(&other, &PositionMetrics::new(45, 0.0));
        assert!((health.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_from_snapshot() {
        let now = Utc::now();
        let pos = position(None, EntryMetadata {
            entry_value: -1000.0,
            ..Default::default()
        });
        let snapshot = GreeksSnapshot {
            symbol: "SPY".to_string(),
            delta: 0.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            rho: 0.0,
            theoretical_value: -400.0,
            spot_price: 450.0,
            computed_at: now,
            legs_priced: 2,
            legs_skipped: 0,
        };
        let metrics = PositionMetrics::from_snapshot(&pos, Some(&snapshot), now);
        assert!((metrics.pnl_percent - 60.0).abs() < 1e-9);
        assert!(metrics.days_to_expiry >= 59);

        let metrics = PositionMetrics::from_snapshot(&pos, None, now);
        assert!(metrics.pnl_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_bands() {
        assert_eq!(HealthLevel::from_score(90.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_score(89.9), HealthLevel::Good);
        assert_eq!(HealthLevel::from_score(60.0), HealthLevel::Fair);
        assert_eq!(HealthLevel::from_score(40.0), HealthLevel::Poor);
        assert_eq!(HealthLevel::from_score(39.9), HealthLevel::Critical);
    }
}
