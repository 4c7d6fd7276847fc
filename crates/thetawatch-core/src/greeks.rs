//! Greeks values and immutable snapshots.
//!
//! Sign convention: theta is daily dollar change in position value. A long
//! option decays (negative theta); a short option earns decay (positive
//! theta), because per-contract theta is scaled by the signed quantity.

use std::ops::Add;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Option sensitivities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Daily time decay.
    pub theta: f64,
    /// Per one volatility point.
    pub vega: f64,
    /// Per one rate point.
    pub rho: f64,
}

impl Greeks {
    /// Scale every Greek by a factor (e.g. `quantity * multiplier`).
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            theta: self.theta * factor,
            vega: self.vega * factor,
            rho: self.rho * factor,
        }
    }
}

impl Add for Greeks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            delta: self.delta + rhs.delta,
            gamma: self.gamma + rhs.gamma,
            theta: self.theta + rhs.theta,
            vega: self.vega + rhs.vega,
            rho: self.rho + rhs.rho,
        }
    }
}

/// Position-level Greeks at a point in time.
///
/// Immutable once produced; a recompute supersedes it with a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreeksSnapshot {
    pub symbol: String,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    /// Signed dollar value of all legs at theoretical prices.
    pub theoretical_value: f64,
    /// Spot price used for the computation.
    pub spot_price: f64,
    pub computed_at: DateTime<Utc>,
    /// Legs that contributed.
    pub legs_priced: usize,
    /// Legs rejected because of invalid pricing inputs.
    pub legs_skipped: usize,
}

impl GreeksSnapshot {
    /// Greeks part of the snapshot.
    #[must_use]
    pub fn greeks(&self) -> Greeks {
        Greeks {
            delta: self.delta,
            gamma: self.gamma,
            theta: self.theta,
            vega: self.vega,
            rho: self.rho,
        }
    }

    /// Age of the snapshot in milliseconds.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.computed_at).num_milliseconds()
    }

    /// Whether the snapshot may still be reused: `now - computed_at < ttl`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_ms: u64) -> bool {
        self.age_ms(now) < ttl_ms as i64
    }

    /// Delta change for a 1% move in the underlying.
    #[must_use]
    pub fn gamma_one_percent(&self) -> f64 {
        self.gamma * self.spot_price * 0.01
    }
}

/// Coarse risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBucket {
    #[default]
    Low,
    Medium,
    High,
    Extreme,
}

impl std::fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// Portfolio aggregate of all live position snapshots.
///
/// Recomputed wholesale; never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    /// Sum of theoretical values.
    pub theoretical_value: f64,
    /// Aggregate delta change for a 1% move in every underlying.
    pub gamma_one_percent: f64,
    /// Number of subscribed positions.
    pub position_count: usize,
    /// Number of positions with a live snapshot.
    pub priced_count: usize,
    /// 0 (worst) to 100 (best).
    pub risk_score: f64,
    pub gamma_risk: RiskBucket,
    pub vega_risk: RiskBucket,
    /// `|delta| < 50`.
    pub delta_neutral: bool,
    pub computed_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Snapshot of an empty portfolio.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            delta: 0.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            rho: 0.0,
            theoretical_value: 0.0,
            gamma_one_percent: 0.0,
            position_count: 0,
            priced_count: 0,
            risk_score: 100.0,
            gamma_risk: RiskBucket::Low,
            vega_risk: RiskBucket::Low,
            delta_neutral: true,
            computed_at: now,
        }
    }

    /// Greeks part of the snapshot.
    #[must_use]
    pub fn greeks(&self) -> Greeks {
        Greeks {
            delta: self.delta,
            gamma: self.gamma,
            theta: self.theta,
            vega: self.vega,
            rho: self.rho,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(computed_at: DateTime<Utc>) -> GreeksSnapshot {
        GreeksSnapshot {
            symbol: "SPY".to_string(),
            delta: 10.0,
            gamma: 2.0,
            theta: 5.0,
            vega: -30.0,
            rho: 0.5,
            theoretical_value: -420.0,
            spot_price: 450.0,
            computed_at,
            legs_priced: 2,
            legs_skipped: 0,
        }
    }

    #[test]
    fn test_scale_and_add() {
        let g = Greeks {
            delta: 0.5,
            gamma: 0.02,
            theta: -0.05,
            vega: 0.15,
            rho: 0.08,
        };
        let total = g.scale(-100.0) + g.scale(200.0);
        assert!((total.delta - 50.0).abs() < 1e-9);
        assert!((total.theta + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_freshness_is_strict() {
        let t0 = Utc::now();
        let s = snapshot(t0);
        assert!(s.is_fresh(t0 + Duration::milliseconds(499), 500));
        assert!(!s.is_fresh(t0 + Duration::milliseconds(500), 500));
    }

    #[test]
    fn test_gamma_one_percent() {
        let s = snapshot(Utc::now());
        assert!((s.gamma_one_percent() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_ordering() {
        assert!(RiskBucket::Extreme > RiskBucket::High);
        assert_eq!(RiskBucket::Medium.to_string(), "MEDIUM");
    }
}
