//! Portfolio aggregation and risk classification.

use chrono::{DateTime, Utc};
use thetawatch_core::{GreeksSnapshot, PortfolioSnapshot, RiskBucket};

/// `|delta|` below which the portfolio is considered delta neutral.
pub const DELTA_NEUTRAL_BAND: f64 = 50.0;

/// Dollar-gamma (delta change per 1% move) bucket edges.
const GAMMA_BUCKETS: [f64; 3] = [100.0, 300.0, 500.0];

/// Dollar-vega bucket edges at a normal volatility regime.
const VEGA_BUCKETS: [f64; 3] = [200.0, 500.0, 1000.0];

const DELTA_PENALTY_START: f64 = 100.0;
const MAX_DELTA_PENALTY: f64 = 25.0;
const MAX_THETA_BONUS: f64 = 10.0;

fn bucket(value: f64, edges: [f64; 3]) -> RiskBucket {
    let value = value.abs();
    if value < edges[0] {
        RiskBucket::Low
    } else if value < edges[1] {
        RiskBucket::Medium
    } else if value < edges[2] {
        RiskBucket::High
    } else {
        RiskBucket::Extreme
    }
}

/// Classify aggregate dollar gamma for a 1% move.
#[must_use]
pub fn gamma_bucket(gamma_one_percent: f64) -> RiskBucket {
    bucket(gamma_one_percent, GAMMA_BUCKETS)
}

/// Vega threshold multiplier for the current VIX level: wider below 15,
/// tighter above 30.
#[must_use]
pub fn vega_regime_scale(vix: Option<f64>) -> f64 {
    match vix {
        Some(v) if v < 15.0 => 1.25,
        Some(v) if v > 30.0 => 0.75,
        _ => 1.0,
    }
}

/// Classify aggregate dollar vega under the given VIX regime.
#[must_use]
pub fn vega_bucket(vega: f64, vix: Option<f64>) -> RiskBucket {
    let scale = vega_regime_scale(vix);
    bucket(vega, VEGA_BUCKETS.map(|edge| edge * scale))
}

/// Risk score in [0, 100]; higher is safer.
#[must_use]
pub fn risk_score(delta: f64, theta: f64, gamma_risk: RiskBucket, vega_risk: RiskBucket) -> f64 {
    let mut score = 100.0;

    if delta.abs() > DELTA_PENALTY_START {
        score -= ((delta.abs() - DELTA_PENALTY_START) / 20.0).min(MAX_DELTA_PENALTY);
    }

    score -= match gamma_risk {
        RiskBucket::High => 15.0,
        RiskBucket::Extreme => 30.0,
        _ => 0.0,
    };

    score -= match vega_risk {
        RiskBucket::High => 20.0,
        RiskBucket::Extreme => 40.0,
        _ => 0.0,
    };

    if theta > 0.0 {
        score += (theta / 10.0).min(MAX_THETA_BONUS);
    }

    score.clamp(0.0, 100.0)
}

/// Sum live snapshots into a fresh portfolio snapshot.
///
/// `position_count` is the number of subscribed positions, which may exceed
/// the number of snapshots while positions await their first tick.
pub fn aggregate<'a, I>(
    snapshots: I,
    position_count: usize,
    vix: Option<f64>,
    now: DateTime<Utc>,
) -> PortfolioSnapshot
where
    I: IntoIterator<Item = &'a GreeksSnapshot>,
{
    let mut portfolio = PortfolioSnapshot::empty(now);
    portfolio.position_count = position_count;

    for snapshot in snapshots {
        portfolio.delta += snapshot.delta;
        portfolio.gamma += snapshot.gamma;
        portfolio.theta += snapshot.theta;
        portfolio.vega += snapshot.vega;
        portfolio.rho += snapshot.rho;
        portfolio.theoretical_value += snapshot.theoretical_value;
        portfolio.gamma_one_percent += snapshot.gamma_one_percent();
        portfolio.priced_count += 1;
    }

    portfolio.gamma_risk = gamma_bucket(portfolio.gamma_one_percent);
    portfolio.vega_risk = vega_bucket(portfolio.vega, vix);
    portfolio.delta_neutral = portfolio.delta.abs() < DELTA_NEUTRAL_BAND;
    portfolio.risk_score = risk_score(
        portfolio.delta,
        portfolio.theta,
        portfolio.gamma_risk,
        portfolio.vega_risk,
    );

    portfolio
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(symbol: &str, delta: f64, gamma: f64, theta: f64, vega: f64, spot: f64) -> GreeksSnapshot {
        GreeksSnapshot {
            symbol: symbol.to_string(),
            delta,
            gamma,
            theta,
            vega,
            rho: 0.1,
            theoretical_value: -100.0,
            spot_price: spot,
            computed_at: Utc::now(),
            legs_priced: 1,
            legs_skipped: 0,
        }
    }

    #[test]
    fn test_delta_is_exact_sum() {
        let snapshots = vec![
            snapshot("SPY", 12.345678, 0.5, 3.0, -20.0, 450.0),
            snapshot("QQQ", -40.1, 0.2, 5.0, -10.0, 380.0),
            snapshot("IWM", 7.7, 0.1, 1.0, 5.0, 200.0),
        ];
        let portfolio = aggregate(&snapshots, 3, None, Utc::now());
        let expected: f64 = snapshots.iter().map(|s| s.delta).sum();

        assert!((portfolio.delta - expected).abs() < 1e-6);
        assert_eq!(portfolio.position_count, 3);
        assert_eq!(portfolio.priced_count, 3);
        assert!(portfolio.delta_neutral);
    }

    #[test]
    fn test_empty_portfolio() {
        let portfolio = aggregate(std::iter::empty(), 0, None, Utc::now());
        assert_eq!(portfolio.position_count, 0);
        assert!((portfolio.risk_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.gamma_risk, RiskBucket::Low);
    }

    #[test]
    fn test_gamma_bucket_uses_one_percent_move() {
        // 75 gamma * 450 spot * 0.01 = 337.5 delta per 1% move
        let snapshots = vec![snapshot("SPY", 0.0, 75.0, 0.0, 0.0, 450.0)];
        let portfolio = aggregate(&snapshots, 1, None, Utc::now());
        assert!((portfolio.gamma_one_percent - 337.5).abs() < 1e-9);
        assert_eq!(portfolio.gamma_risk, RiskBucket::High);
    }

    #[test]
    fn test_vega_bucket_regimes() {
        assert_eq!(vega_bucket(-550.0, None), RiskBucket::High);
        // Low VIX: edges become 250/625/1250.
        assert_eq!(vega_bucket(-550.0, Some(12.0)), RiskBucket::Medium);
        // High VIX: edges become 150/375/750.
        assert_eq!(vega_bucket(-550.0, Some(35.0)), RiskBucket::High);
        assert_eq!(vega_bucket(-800.0, Some(35.0)), RiskBucket::Extreme);
    }

    #[test]
    fn test_risk_score_penalties_and_bonus() {
        assert!((risk_score(0.0, 0.0, RiskBucket::Low, RiskBucket::Low) - 100.0).abs() < 1e-9);
        // 300 delta -> -10, extreme gamma -30, high vega -20
        let score = risk_score(300.0, 0.0, RiskBucket::Extreme, RiskBucket::High);
        assert!((score - 40.0).abs() < 1e-9);
        // delta penalty caps at 25, theta bonus caps at 10
        let score = risk_score(-5000.0, 500.0, RiskBucket::Low, RiskBucket::Low);
        assert!((score - 85.0).abs() < 1e-9);
        let score = risk_score(5000.0, 0.0, RiskBucket::Extreme, RiskBucket::Extreme);
        assert!((score - 5.0).abs() < 1e-9);
    }
}
