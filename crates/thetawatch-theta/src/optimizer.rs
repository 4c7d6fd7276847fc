//! Theta income optimizer.
//!
//! Adjusts per-bucket daily theta targets for the VIX regime, measures the
//! theta the live book currently earns per bucket, and turns material
//! shortfalls into sized recommendations.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thetawatch_core::StrategyTag;
use tracing::debug;

use crate::config::{StrategyBucket, ThetaConfig, ThetaTargets};
use crate::error::{ThetaError, ThetaResult};

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Theta facts about one live position.
#[derive(Debug, Clone, PartialEq)]
pub struct ThetaInput {
    pub symbol: String,
    pub strategy: Option<StrategyTag>,
    pub days_to_expiry: i64,
    /// Daily theta per contract.
    pub theta_per_contract: f64,
    pub contracts: u64,
    /// Premium collected (or paid) at entry, in dollars.
    pub premium: f64,
}

impl ThetaInput {
    /// Bucket by explicit tag, else by DTE range, else `Other`.
    #[must_use]
    pub fn bucket(&self) -> StrategyBucket {
        self.strategy
            .and_then(StrategyBucket::from_tag)
            .unwrap_or_else(|| StrategyBucket::from_dte(self.days_to_expiry))
    }

    #[must_use]
    pub fn theta(&self) -> f64 {
        self.theta_per_contract.abs() * self.contracts as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketTheta {
    pub theta: f64,
    pub positions: usize,
    /// Theta-weighted average of theta / premium.
    pub efficiency: f64,
    #[serde(skip)]
    efficiency_weight: f64,
}

impl BucketTheta {
    fn fold(&mut self, theta: f64, premium: f64) {
        self.theta += theta;
        self.positions += 1;

        if premium.abs() > 0.0 && theta > 0.0 {
            let ratio = theta / premium.abs();
            let weight = self.efficiency_weight + theta;
            self.efficiency = (self.efficiency * self.efficiency_weight + ratio * theta) / weight;
            self.efficiency_weight = weight;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentTheta {
    pub buckets: BTreeMap<StrategyBucket, BucketTheta>,
    pub total: f64,
}

impl CurrentTheta {
    #[must_use]
    pub fn theta(&self, bucket: StrategyBucket) -> f64 {
        self.buckets.get(&bucket).map_or(0.0, |b| b.theta)
    }

    /// Build directly from per-bucket totals.
    #[must_use]
    pub fn from_totals(totals: &[(StrategyBucket, f64)]) -> Self {
        let mut current = Self::default();
        for &(bucket, theta) in totals {
            let entry = current.buckets.entry(bucket).or_default();
            entry.theta += theta;
            current.total += theta;
        }
        current
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThetaGap {
    pub bucket: StrategyBucket,
    pub current: f64,
    pub target: f64,
    /// `target - current`; negative when over target.
    pub gap: f64,
    pub percent_of_target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feasibility {
    High,
    Medium,
    Low,
}

impl Feasibility {
    /// Band by buying power as a percentage of the account.
    #[must_use]
    pub fn from_bp_percentage(pct: f64) -> Self {
        if pct < 15.0 {
            Self::High
        } else if pct < 25.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// `None` for the portfolio-level recommendation.
    pub bucket: Option<StrategyBucket>,
    pub gap: f64,
    pub contracts_needed: u64,
    pub bp_required: Decimal,
    /// Buying power as a percentage of account value.
    pub bp_percentage: f64,
    pub feasibility: Feasibility,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub vix_level: f64,
    pub vix_multiplier: f64,
    pub targets: ThetaTargets,
    pub current: CurrentTheta,
    pub gaps: Vec<ThetaGap>,
    pub total_gap: f64,
    pub recommendations: Vec<Recommendation>,
    pub balance_score: f64,
}

// ============================================================================
// ThetaOptimizer
// ============================================================================

#[derive(Debug, Clone)]
pub struct ThetaOptimizer {
    config: ThetaConfig,
}

impl ThetaOptimizer {
    pub fn new(config: ThetaConfig) -> ThetaResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ThetaConfig {
        &self.config
    }

    /// Regime multiplier for `vix_level`: first regime whose bound is at or
    /// above the level, else the extreme multiplier.
    #[must_use]
    pub fn vix_multiplier(&self, vix_level: f64) -> f64 {
        self.config
            .vix_regimes
            .iter()
            .find(|r| vix_level <= r.up_to)
            .map_or(self.config.extreme_vix_multiplier, |r| r.multiplier)
    }

    pub fn adjust_targets_for_vix(
        &self,
        base: &ThetaTargets,
        vix_level: f64,
    ) -> ThetaResult<ThetaTargets> {
        check_vix(vix_level)?;
        Ok(base.scale(self.vix_multiplier(vix_level)))
    }

    #[must_use]
    pub fn analyze_current(&self, positions: &[ThetaInput]) -> CurrentTheta {
        let mut current = CurrentTheta::default();
        for position in positions {
            let theta = position.theta();
            current
                .buckets
                .entry(position.bucket())
                .or_default()
                .fold(theta, position.premium);
            current.total += theta;
        }
        current
    }

    /// Gaps for every targeted bucket.
    #[must_use]
    pub fn compute_gaps(&self, current: &CurrentTheta, targets: &ThetaTargets) -> Vec<ThetaGap> {
        StrategyBucket::TARGETED
            .iter()
            .map(|&bucket| {
                let current = current.theta(bucket);
                let target = targets.get(bucket);
                let percent_of_target = if target > 0.0 {
                    current / target * 100.0
                } else {
                    100.0
                };
                ThetaGap {
                    bucket,
                    current,
                    target,
                    gap: target - current,
                    percent_of_target,
                }
            })
            .collect()
    }

    pub fn recommend(
        &self,
        gaps: &[ThetaGap],
        account_value: Decimal,
        vix_level: f64,
    ) -> ThetaResult<Vec<Recommendation>> {
        if account_value <= Decimal::ZERO {
            return Err(ThetaError::InvalidAccountValue(account_value));
        }
        check_vix(vix_level)?;
        let multiplier = self.vix_multiplier(vix_level);

        let mut recommendations = Vec::new();
        let mut total_bp = Decimal::ZERO;
        let mut total_contracts = 0u64;

        for gap in gaps.iter().filter(|g| g.gap > self.config.material_gap) {
            let Some(economics) = self.config.economics.get(gap.bucket) else {
                continue;
            };
            // Float-to-int casts saturate, so absurd gaps clamp to u64::MAX.
            let contracts_needed = (gap.gap / economics.avg_theta_per_contract).ceil() as u64;
            let bp_required = economics
                .bp_per_contract
                .checked_mul(Decimal::from(contracts_needed))
                .unwrap_or(Decimal::MAX);
            let bp_percentage = percent_of(bp_required, account_value);

            total_bp = total_bp.checked_add(bp_required).unwrap_or(Decimal::MAX);
            total_contracts = total_contracts.saturating_add(contracts_needed);
            recommendations.push(Recommendation {
                bucket: Some(gap.bucket),
                gap: gap.gap,
                contracts_needed,
                bp_required,
                bp_percentage,
                feasibility: Feasibility::from_bp_percentage(bp_percentage),
                message: format!(
                    "Add {} {} contracts for ${:.0}/day (VIX {:.1}, x{:.2} regime)",
                    contracts_needed, gap.bucket, gap.gap, vix_level, multiplier
                ),
            });
        }

        let total_gap: f64 = gaps.iter().map(|g| g.gap.max(0.0)).sum();
        if total_gap > self.config.portfolio_gap_threshold {
            let bp_percentage = percent_of(total_bp, account_value);
            recommendations.push(Recommendation {
                bucket: None,
                gap: total_gap,
                contracts_needed: total_contracts,
                bp_required: total_bp,
                bp_percentage,
                feasibility: Feasibility::from_bp_percentage(bp_percentage),
                message: format!(
                    "Portfolio is ${:.0}/day short of its theta target",
                    total_gap
                ),
            });
        }

        debug!(
            recommendations = recommendations.len(),
            total_gap,
            vix_level,
            "Theta recommendations computed"
        );
        Ok(recommendations)
    }

    /// 0-100 score for how closely the theta mix matches the target mix.
    #[must_use]
    pub fn balance_score(&self, current: &CurrentTheta, targets: &ThetaTargets) -> f64 {
        let target_total = targets.total();
        let current_total = current.total;
        let mut score: f64 = 100.0;

        let share = |value: f64, total: f64| if total > 0.0 { value / total * 100.0 } else { 0.0 };

        for bucket in StrategyBucket::TARGETED {
            let target_share = share(targets.get(bucket), target_total);
            let current_share = share(current.theta(bucket), current_total);
            if (current_share - target_share).abs() > self.config.allocation_tolerance_pct {
                score -= 20.0;
            }
        }

        let concentrated = current
            .buckets
            .values()
            .any(|b| share(b.theta, current_total) > self.config.concentration_limit_pct);
        if concentrated {
            score -= 15.0;
        }

        score.max(0.0)
    }

    /// Full optimization pass over the live book.
    pub fn summarize(
        &self,
        positions: &[ThetaInput],
        account_value: Decimal,
        vix_level: f64,
    ) -> ThetaResult<OptimizationSummary> {
        let targets = self.adjust_targets_for_vix(&self.config.base_targets, vix_level)?;
        let current = self.analyze_current(positions);
        let gaps = self.compute_gaps(&current, &targets);
        let recommendations = self.recommend(&gaps, account_value, vix_level)?;
        let total_gap = gaps.iter().map(|g| g.gap.max(0.0)).sum();
        let balance_score = self.balance_score(&current, &targets);

        Ok(OptimizationSummary {
            vix_level,
            vix_multiplier: self.vix_multiplier(vix_level),
            targets,
            current,
            gaps,
            total_gap,
            recommendations,
            balance_score,
        })
    }
}

fn check_vix(vix_level: f64) -> ThetaResult<()> {
    if vix_level.is_finite() && vix_level >= 0.0 {
        Ok(())
    } else {
        Err(ThetaError::InvalidVix(vix_level))
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> f64 {
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|percent| percent.to_f64())
        .unwrap_or(f64::INFINITY)
}
