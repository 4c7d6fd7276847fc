//! Theta optimizer configuration.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thetawatch_core::StrategyTag;

use crate::error::{ThetaError, ThetaResult};

/// Income bucket a position's theta is credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyBucket {
    Dte0,
    Lt112,
    Strangles,
    Other,
}

impl StrategyBucket {
    /// Buckets that carry a target.
    pub const TARGETED: [StrategyBucket; 3] = [Self::Dte0, Self::Lt112, Self::Strangles];

    /// Bucket for an explicit strategy tag. `Other` has no bucket of its own.
    #[must_use]
    pub fn from_tag(tag: StrategyTag) -> Option<Self> {
        match tag {
            StrategyTag::ZeroDte => Some(Self::Dte0),
            StrategyTag::Lt112 => Some(Self::Lt112),
            StrategyTag::Strangle | StrategyTag::IronCondor => Some(Self::Strangles),
            StrategyTag::Other => None,
        }
    }

    /// Bucket inferred from days to expiry.
    #[must_use]
    pub fn from_dte(days_to_expiry: i64) -> Self {
        match days_to_expiry {
            i64::MIN..=1 => Self::Dte0,
            30..=60 => Self::Strangles,
            90..=130 => Self::Lt112,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StrategyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dte0 => "dte0",
            Self::Lt112 => "lt112",
            Self::Strangles => "strangles",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Daily dollar theta per targeted bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThetaTargets {
    pub dte0: f64,
    pub lt112: f64,
    pub strangles: f64,
}

impl ThetaTargets {
    #[must_use]
    pub const fn new(dte0: f64, lt112: f64, strangles: f64) -> Self {
        Self {
            dte0,
            lt112,
            strangles,
        }
    }

    /// Target for `bucket`; `Other` is never targeted.
    #[must_use]
    pub fn get(&self, bucket: StrategyBucket) -> f64 {
        match bucket {
            StrategyBucket::Dte0 => self.dte0,
            StrategyBucket::Lt112 => self.lt112,
            StrategyBucket::Strangles => self.strangles,
            StrategyBucket::Other => 0.0,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.dte0 + self.lt112 + self.strangles
    }

    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.dte0 * factor, self.lt112 * factor, self.strangles * factor)
    }
}

/// One row of the VIX regime table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VixRegime {
    /// Inclusive upper VIX bound.
    pub up_to: f64,
    pub multiplier: f64,
}

/// Per-contract economics used to size recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractEconomics {
    pub avg_theta_per_contract: f64,
    pub bp_per_contract: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketEconomics {
    pub dte0: ContractEconomics,
    pub lt112: ContractEconomics,
    pub strangles: ContractEconomics,
}

impl BucketEconomics {
    #[must_use]
    pub fn get(&self, bucket: StrategyBucket) -> Option<&ContractEconomics> {
        match bucket {
            StrategyBucket::Dte0 => Some(&self.dte0),
            StrategyBucket::Lt112 => Some(&self.lt112),
            StrategyBucket::Strangles => Some(&self.strangles),
            StrategyBucket::Other => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThetaConfig {
    /// Baseline daily theta targets at a neutral VIX.
    #[serde(default = "default_base_targets")]
    pub base_targets: ThetaTargets,

    /// Ascending VIX regime table.
    #[serde(default = "default_vix_regimes")]
    pub vix_regimes: Vec<VixRegime>,

    /// Multiplier above the last regime bound.
    #[serde(default = "default_extreme_vix_multiplier")]
    pub extreme_vix_multiplier: f64,

    #[serde(default = "default_economics")]
    pub economics: BucketEconomics,

    /// Smallest bucket gap worth a recommendation.
    #[serde(default = "default_material_gap")]
    pub material_gap: f64,

    /// Total gap above which a portfolio-level recommendation is added.
    #[serde(default = "default_portfolio_gap_threshold")]
    pub portfolio_gap_threshold: f64,

    /// Allowed deviation of a bucket's share from its target share, in percent.
    #[serde(default = "default_allocation_tolerance_pct")]
    pub allocation_tolerance_pct: f64,

    /// Largest share of total theta a single bucket may hold, in percent.
    #[serde(default = "default_concentration_limit_pct")]
    pub concentration_limit_pct: f64,
}

fn default_base_targets() -> ThetaTargets {
    ThetaTargets::new(150.0, 200.0, 120.0)
}

fn default_vix_regimes() -> Vec<VixRegime> {
    vec![
        VixRegime { up_to: 12.0, multiplier: 1.4 },
        VixRegime { up_to: 15.0, multiplier: 1.2 },
        VixRegime { up_to: 20.0, multiplier: 1.0 },
        VixRegime { up_to: 25.0, multiplier: 0.9 },
        VixRegime { up_to: 30.0, multiplier: 0.85 },
        VixRegime { up_to: 50.0, multiplier: 0.8 },
    ]
}

fn default_extreme_vix_multiplier() -> f64 {
    0.7
}

fn default_economics() -> BucketEconomics {
    BucketEconomics {
        dte0: ContractEconomics {
            avg_theta_per_contract: 25.0,
            bp_per_contract: Decimal::from(2_000),
        },
        lt112: ContractEconomics {
            avg_theta_per_contract: 5.0,
            bp_per_contract: Decimal::from(4_000),
        },
        strangles: ContractEconomics {
            avg_theta_per_contract: 8.0,
            bp_per_contract: Decimal::from(6_000),
        },
    }
}

fn default_material_gap() -> f64 {
    10.0
}

fn default_portfolio_gap_threshold() -> f64 {
    100.0
}

fn default_allocation_tolerance_pct() -> f64 {
    15.0
}

fn default_concentration_limit_pct() -> f64 {
    60.0
}

impl Default for ThetaConfig {
    fn default() -> Self {
        Self {
            base_targets: default_base_targets(),
            vix_regimes: default_vix_regimes(),
            extreme_vix_multiplier: default_extreme_vix_multiplier(),
            economics: default_economics(),
            material_gap: default_material_gap(),
            portfolio_gap_threshold: default_portfolio_gap_threshold(),
            allocation_tolerance_pct: default_allocation_tolerance_pct(),
            concentration_limit_pct: default_concentration_limit_pct(),
        }
    }
}

impl ThetaConfig {
    pub fn validate(&self) -> ThetaResult<()> {
        let t = &self.base_targets;
        if [t.dte0, t.lt112, t.strangles]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ThetaError::Config(
                "base_targets must be finite and non-negative".to_string(),
            ));
        }

        if self.vix_regimes.is_empty() {
            return Err(ThetaError::Config("vix_regimes must not be empty".to_string()));
        }
        for pair in self.vix_regimes.windows(2) {
            if pair[1].up_to <= pair[0].up_to {
                return Err(ThetaError::Config(
                    "vix_regimes must be strictly ascending".to_string(),
                ));
            }
        }
        if self
            .vix_regimes
            .iter()
            .map(|r| r.multiplier)
            .chain(std::iter::once(self.extreme_vix_multiplier))
            .any(|m| !(m > 0.0))
        {
            return Err(ThetaError::Config("VIX multipliers must be positive".to_string()));
        }

        for bucket in StrategyBucket::TARGETED {
            if let Some(e) = self.economics.get(bucket) {
                if !(e.avg_theta_per_contract > 0.0) {
                    return Err(ThetaError::Config(format!(
                        "{bucket} avg_theta_per_contract must be positive"
                    )));
                }
                if e.bp_per_contract <= Decimal::ZERO {
                    return Err(ThetaError::Config(format!(
                        "{bucket} bp_per_contract must be positive"
                    )));
                }
            }
        }

        if self.material_gap < 0.0 || self.portfolio_gap_threshold < 0.0 {
            return Err(ThetaError::Config("gap thresholds must be non-negative".to_string()));
        }
        if !(0.0..=100.0).contains(&self.concentration_limit_pct) {
            return Err(ThetaError::Config(
                "concentration_limit_pct must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = ThetaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.economics.strangles.bp_per_contract, dec!(6000));
        assert_eq!(config.vix_regimes[0].multiplier, 1.4);
    }

    #[test]
    fn test_config_serde_defaults() {
        let toml_str = r#"
material_gap = 5.0

[base_targets]
dte0 = 100.0
lt112 = 150.0
strangles = 80.0
"#;
        let config: ThetaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.material_gap, 5.0);
        assert_eq!(config.base_targets, ThetaTargets::new(100.0, 150.0, 80.0));
        assert_eq!(config.vix_regimes.len(), 6);
        assert_eq!(config.extreme_vix_multiplier, 0.7);
    }

    #[test]
    fn test_validation_rejects_bad_tables() {
        let mut config = ThetaConfig::default();
        config.vix_regimes.swap(0, 1);
        assert!(config.validate().is_err());

        let mut config = ThetaConfig::default();
        config.economics.lt112.avg_theta_per_contract = 0.0;
        assert!(config.validate().is_err());

        let mut config = ThetaConfig::default();
        config.economics.dte0.bp_per_contract = dec!(0);
        assert!(config.validate().is_err());

        let mut config = ThetaConfig::default();
        config.vix_regimes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bucket_mapping() {
        assert_eq!(StrategyBucket::from_tag(StrategyTag::ZeroDte), Some(StrategyBucket::Dte0));
        assert_eq!(
            StrategyBucket::from_tag(StrategyTag::IronCondor),
            Some(StrategyBucket::Strangles)
        );
        assert_eq!(StrategyBucket::from_tag(StrategyTag::Other), None);

        assert_eq!(StrategyBucket::from_dte(0), StrategyBucket::Dte0);
        assert_eq!(StrategyBucket::from_dte(45), StrategyBucket::Strangles);
        assert_eq!(StrategyBucket::from_dte(112), StrategyBucket::Lt112);
        assert_eq!(StrategyBucket::from_dte(200), StrategyBucket::Other);
    }
}
