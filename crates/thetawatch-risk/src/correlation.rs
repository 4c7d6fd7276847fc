//! Correlation-group concentration limits.
//!
//! Every ticker maps to a correlation group through a static table. The
//! number of live positions allowed per group depends on the account phase,
//! stricter in early phases. Unmapped tickers are `Uncorrelated` and exempt
//! from limits.
//!
//! The equity-index group is flagged HIGH as soon as a new position would
//! fill it to its limit: correlated index exposure is the scenario the
//! limits exist for.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::emergency_stop::EmergencyStop;
use crate::error::{RiskError, RiskResult};

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationGroup {
    EquityIndex,
    Metals,
    Energy,
    Currencies,
    Bonds,
    Agriculture,
    Volatility,
    /// Sentinel for unmapped tickers. Never limited.
    Uncorrelated,
}

impl fmt::Display for CorrelationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EquityIndex => "equity_index",
            Self::Metals => "metals",
            Self::Energy => "energy",
            Self::Currencies => "currencies",
            Self::Bonds => "bonds",
            Self::Agriculture => "agriculture",
            Self::Volatility => "volatility",
            Self::Uncorrelated => "uncorrelated",
        };
        f.write_str(s)
    }
}

/// Normalize a position symbol to its underlying ticker.
///
/// `"/es"` and `"SPY 250117C500"` become `"ES"` and `"SPY"`.
#[must_use]
pub fn underlying_ticker(symbol: &str) -> String {
    symbol
        .trim()
        .trim_start_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

// ============================================================================
// Configuration
// ============================================================================

/// Maximum positions per group for one account phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLimit {
    pub phase: u8,
    pub max_per_group: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Ticker to group.
    #[serde(default = "default_groups")]
    pub groups: HashMap<String, CorrelationGroup>,
    #[serde(default = "default_phase_limits")]
    pub phase_limits: Vec<PhaseLimit>,
}

fn default_groups() -> HashMap<String, CorrelationGroup> {
    use CorrelationGroup::*;

    let table: &[(&[&str], CorrelationGroup)] = &[
        (
            &["SPY", "SPX", "XSP", "QQQ", "NDX", "IWM", "RUT", "DIA", "ES", "MES", "NQ", "MNQ", "RTY", "M2K", "YM", "MYM"],
            EquityIndex,
        ),
        (&["GLD", "SLV", "GC", "MGC", "SI", "SIL", "HG", "MHG", "PL"], Metals),
        (&["USO", "XLE", "XOP", "CL", "MCL", "NG", "QG", "RB", "HO"], Energy),
        (&["FXE", "FXY", "UUP", "6E", "6B", "6J", "6A", "6C", "M6E"], Currencies),
        (&["TLT", "IEF", "ZB", "ZN", "ZF", "ZT", "UB"], Bonds),
        (&["ZC", "ZS", "ZW", "ZL", "ZM", "CORN", "SOYB", "WEAT"], Agriculture),
        (&["VIX", "VX", "UVXY", "VXX"], Volatility),
    ];

    table
        .iter()
        .flat_map(|(tickers, group)| tickers.iter().map(move |t| (t.to_string(), *group)))
        .collect()
}

fn default_phase_limits() -> Vec<PhaseLimit> {
    vec![
        PhaseLimit { phase: 1, max_per_group: 2 },
        PhaseLimit { phase: 2, max_per_group: 2 },
        PhaseLimit { phase: 3, max_per_group: 3 },
        PhaseLimit { phase: 4, max_per_group: 4 },
    ]
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            phase_limits: default_phase_limits(),
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.phase_limits.is_empty() {
            return Err(RiskError::Config("phase_limits must not be empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for limit in &self.phase_limits {
            if limit.max_per_group == 0 {
                return Err(RiskError::Config(format!(
                    "phase {} max_per_group must be positive",
                    limit.phase
                )));
            }
            if !seen.insert(limit.phase) {
                return Err(RiskError::Config(format!("duplicate phase {}", limit.phase)));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentrationLevel {
    /// Group is exactly at its limit.
    Warning,
    /// Group is over its limit (or equity-index at risk of it).
    High,
}

/// Answer to "may this ticker be added?".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddDecision {
    pub allowed: bool,
    pub group: CorrelationGroup,
    /// Live positions in the group before the addition.
    pub count: usize,
    pub limit: usize,
    pub flag: Option<ConcentrationLevel>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupViolation {
    pub group: CorrelationGroup,
    pub count: usize,
    pub limit: usize,
    pub level: ConcentrationLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationReport {
    pub phase: u8,
    pub limit: usize,
    /// Live positions per group, including `Uncorrelated`.
    pub counts: BTreeMap<CorrelationGroup, usize>,
    pub violations: Vec<GroupViolation>,
    /// True iff any HIGH violation exists.
    pub violated: bool,
}

// ============================================================================
// CorrelationTracker
// ============================================================================

#[derive(Debug)]
pub struct CorrelationTracker {
    config: CorrelationConfig,
    stop: Arc<EmergencyStop>,
}

impl CorrelationTracker {
    pub fn new(config: CorrelationConfig, stop: Arc<EmergencyStop>) -> RiskResult<Self> {
        config.validate()?;
        let groups = config
            .groups
            .into_iter()
            .map(|(ticker, group)| (underlying_ticker(&ticker), group))
            .collect();
        Ok(Self {
            config: CorrelationConfig {
                groups,
                phase_limits: config.phase_limits,
            },
            stop,
        })
    }

    #[must_use]
    pub fn group_of(&self, ticker: &str) -> CorrelationGroup {
        self.config
            .groups
            .get(&underlying_ticker(ticker))
            .copied()
            .unwrap_or(CorrelationGroup::Uncorrelated)
    }

    /// Per-group limit for `phase`.
    ///
    /// An unconfigured phase falls back to the most permissive configured
    /// limit, never to an unbounded one.
    #[must_use]
    pub fn max_per_group(&self, phase: u8) -> usize {
        if let Some(limit) = self.config.phase_limits.iter().find(|l| l.phase == phase) {
            return limit.max_per_group;
        }
        let fallback = self
            .config
            .phase_limits
            .iter()
            .map(|l| l.max_per_group)
            .max()
            .unwrap_or(1);
        warn!(phase, fallback, "No correlation limit for phase, using most permissive");
        fallback
    }

    fn count_in<'a, I>(&self, group: CorrelationGroup, live: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        live.into_iter().filter(|t| self.group_of(t) == group).count()
    }

    /// Decide whether a new position in `ticker` may be opened.
    pub fn can_add<'a, I>(&self, ticker: &str, phase: u8, live: I) -> AddDecision
    where
        I: IntoIterator<Item = &'a str>,
    {
        let group = self.group_of(ticker);
        let limit = self.max_per_group(phase);
        let count = self.count_in(group, live);

        let decision = if self.stop.is_active() {
            AddDecision {
                allowed: false,
                group,
                count,
                limit,
                flag: Some(ConcentrationLevel::High),
                reason: "emergency stop active".to_string(),
            }
        } else if group == CorrelationGroup::Uncorrelated {
            AddDecision {
                allowed: true,
                group,
                count,
                limit,
                flag: None,
                reason: "uncorrelated ticker, no group limit".to_string(),
            }
        } else if count >= limit {
            let flag = if count > limit || group == CorrelationGroup::EquityIndex {
                ConcentrationLevel::High
            } else {
                ConcentrationLevel::Warning
            };
            AddDecision {
                allowed: false,
                group,
                count,
                limit,
                flag: Some(flag),
                reason: format!("{group} already has {count} positions (limit {limit})"),
            }
        } else if group == CorrelationGroup::EquityIndex && count + 1 == limit {
            AddDecision {
                allowed: true,
                group,
                count,
                limit,
                flag: Some(ConcentrationLevel::High),
                reason: format!("elevated correlated equity exposure: {} of {limit}", count + 1),
            }
        } else {
            AddDecision {
                allowed: true,
                group,
                count,
                limit,
                flag: None,
                reason: format!("{group} at {count} of {limit}"),
            }
        };

        debug!(
            ticker,
            phase,
            group = %decision.group,
            allowed = decision.allowed,
            reason = %decision.reason,
            "Correlation check"
        );
        decision
    }

    /// Group counts and limit violations for the live book.
    pub fn check_concentration<'a, I>(&self, live: I, phase: u8) -> ConcentrationReport
    where
        I: IntoIterator<Item = &'a str>,
    {
        let limit = self.max_per_group(phase);
        let mut counts: BTreeMap<CorrelationGroup, usize> = BTreeMap::new();
        for ticker in live {
            *counts.entry(self.group_of(ticker)).or_default() += 1;
        }

        let violations: Vec<GroupViolation> = counts
            .iter()
            .filter(|(group, _)| **group != CorrelationGroup::Uncorrelated)
            .filter_map(|(&group, &count)| {
                let level = if count > limit {
                    ConcentrationLevel::High
                } else if count == limit {
                    ConcentrationLevel::Warning
                } else {
                    return None;
                };
                Some(GroupViolation {
                    group,
                    count,
                    limit,
                    level,
                })
            })
            .collect();

        let violated = violations
            .iter()
            .any(|v| v.level == ConcentrationLevel::High);
        if violated {
            warn!(phase, limit, "Correlation concentration limit exceeded");
        }

        ConcentrationReport {
            phase,
            limit,
            counts,
            violations,
            violated,
        }
    }
}
