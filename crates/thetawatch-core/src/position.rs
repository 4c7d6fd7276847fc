//! Position types.
//!
//! A `Position` is a mirror of a broker-side option position: a symbol,
//! an optional strategy tag, one or more legs, and the metadata recorded
//! when it was opened.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::option::Leg;

/// Strategy the position was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// Same-day expiration trades.
    #[serde(rename = "0dte")]
    ZeroDte,
    /// Long-duration (~112 DTE) put structures.
    Lt112,
    /// Short strangles.
    Strangle,
    /// Iron condors.
    IronCondor,
    /// Anything else.
    Other,
}

impl StrategyTag {
    /// Whether the strategy has two short sides that can be tested.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        matches!(self, Self::Strangle | Self::IronCondor)
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDte => write!(f, "0dte"),
            Self::Lt112 => write!(f, "lt112"),
            Self::Strangle => write!(f, "strangle"),
            Self::IronCondor => write!(f, "iron_condor"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl FromStr for StrategyTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0dte" | "zero_dte" => Ok(Self::ZeroDte),
            "lt112" => Ok(Self::Lt112),
            "strangle" | "strangles" => Ok(Self::Strangle),
            "iron_condor" | "ic" => Ok(Self::IronCondor),
            "other" => Ok(Self::Other),
            other => Err(CoreError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Which short side of a two-sided position the underlying has moved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestedSide {
    Call,
    Put,
}

/// Metadata recorded when the position was opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Week of the month the position was entered (1-5).
    #[serde(default)]
    pub entry_week: Option<u8>,
    /// Tested side, if any.
    #[serde(default)]
    pub tested_side: Option<TestedSide>,
    /// Whether a written management plan exists for this position.
    #[serde(default)]
    pub management_plan: bool,
    /// Signed dollar value of all legs when opened (negative = net credit).
    #[serde(default)]
    pub entry_value: f64,
    /// When the position was opened.
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

/// An option position tracked by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Underlying symbol (quote key).
    pub symbol: String,
    /// Strategy tag, if the position was tagged at entry.
    #[serde(default)]
    pub strategy: Option<StrategyTag>,
    /// Option legs.
    pub legs: Vec<Leg>,
    /// Entry metadata.
    #[serde(default)]
    pub entry: EntryMetadata,
}

impl Position {
    /// Create a position without entry metadata.
    #[must_use]
    pub fn new(symbol: impl Into<String>, strategy: Option<StrategyTag>, legs: Vec<Leg>) -> Self {
        Self {
            symbol: symbol.into(),
            strategy,
            legs,
            entry: EntryMetadata::default(),
        }
    }

    /// Attach entry metadata.
    #[must_use]
    pub fn with_entry(mut self, entry: EntryMetadata) -> Self {
        self.entry = entry;
        self
    }

    /// Validate that the position has at least one well-formed leg.
    pub fn validate(&self) -> Result<()> {
        if self.legs.is_empty() {
            return Err(CoreError::EmptyPosition(self.symbol.clone()));
        }
        for leg in &self.legs {
            leg.validate()?;
        }
        Ok(())
    }

    /// Days to the nearest leg expiration.
    #[must_use]
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.legs
            .iter()
            .map(|leg| leg.days_to_expiry(now))
            .min()
            .unwrap_or(0)
    }

    /// Largest absolute contract count across legs.
    #[must_use]
    pub fn contracts(&self) -> u64 {
        self.legs
            .iter()
            .map(|leg| leg.quantity.unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// P&L as a percentage of the absolute entry value.
    ///
    /// Returns 0 when no entry value was recorded.
    #[must_use]
    pub fn pnl_percent(&self, current_value: f64) -> f64 {
        let basis = self.entry.entry_value.abs();
        if basis == 0.0 {
            return 0.0;
        }
        (current_value - self.entry.entry_value) / basis * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionType;
    use chrono::Duration;

    fn strangle(now: DateTime<Utc>) -> Position {
        Position::new(
            "SPY",
            Some(StrategyTag::Strangle),
            vec![
                Leg::new(OptionType::Put, 400.0, now + Duration::days(45), -2),
                Leg::new(OptionType::Call, 480.0, now + Duration::days(40), -1),
            ],
        )
    }

    #[test]
    fn test_validate_rejects_empty() {
        let pos = Position::new("SPY", None, vec![]);
        assert!(matches!(pos.validate(), Err(CoreError::EmptyPosition(_))));
    }

    #[test]
    fn test_nearest_expiry_and_contracts() {
        let now = Utc::now();
        let pos = strangle(now);
        assert_eq!(pos.days_to_expiry(now), 40);
        assert_eq!(pos.contracts(), 2);
    }

    #[test]
    fn test_pnl_percent_short_premium() {
        let now = Utc::now();
        let pos = strangle(now).with_entry(EntryMetadata {
            entry_value: -500.0,
            ..Default::default()
        });
        // Credit of 500 now costs 200 to close: 60% of max profit.
        assert!((pos.pnl_percent(-200.0) - 60.0).abs() < 1e-9);
        // Now costs 1500 to close: -200%.
        assert!((pos.pnl_percent(-1500.0) + 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_pnl_percent_without_entry() {
        let pos = strangle(Utc::now());
        assert_eq!(pos.pnl_percent(-123.0), 0.0);
    }

    #[test]
    fn test_strategy_tag_roundtrip_names() {
        assert_eq!("0DTE".parse::<StrategyTag>().unwrap(), StrategyTag::ZeroDte);
        assert_eq!(StrategyTag::IronCondor.to_string(), "iron_condor");
        let tag: StrategyTag = serde_json::from_str("\"0dte\"").unwrap();
        assert_eq!(tag, StrategyTag::ZeroDte);
        assert!(StrategyTag::Strangle.is_two_sided());
        assert!(!StrategyTag::Lt112.is_two_sided());
    }
}
