//! Option contract types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Standard equity option contract multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 100.0;

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Lower bound for time to expiry in years, so pricing never sees zero.
const MIN_TIME_TO_EXPIRY: f64 = 0.001;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl FromStr for OptionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(Self::Call),
            "put" | "p" => Ok(Self::Put),
            other => Err(CoreError::InvalidOptionType(other.to_string())),
        }
    }
}

/// A single option leg of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Strike price.
    pub strike: f64,
    /// Expiration instant.
    pub expiration: DateTime<Utc>,
    /// Call or put.
    pub option_type: OptionType,
    /// Signed contract count (negative = short).
    pub quantity: i64,
    /// Contract multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Implied volatility for this leg, if known (annualized, e.g. 0.25).
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

impl Leg {
    /// Create a leg with the standard multiplier and no volatility override.
    #[must_use]
    pub fn new(
        option_type: OptionType,
        strike: f64,
        expiration: DateTime<Utc>,
        quantity: i64,
    ) -> Self {
        Self {
            strike,
            expiration,
            option_type,
            quantity,
            multiplier: DEFAULT_MULTIPLIER,
            implied_volatility: None,
        }
    }

    /// Override the contract multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Attach an implied volatility.
    #[must_use]
    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.implied_volatility = Some(volatility);
        self
    }

    /// Factor applied to per-contract Greeks: `quantity * multiplier`.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.quantity as f64 * self.multiplier
    }

    /// Time to expiry in years, floored at 0.001.
    #[must_use]
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (self.expiration - now).num_milliseconds() as f64 / 1000.0;
        (seconds / SECONDS_PER_YEAR).max(MIN_TIME_TO_EXPIRY)
    }

    /// Calendar days to expiration (0 on expiration day and after).
    #[must_use]
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiration.date_naive() - now.date_naive())
            .num_days()
            .max(0)
    }

    /// Validate static leg fields.
    pub fn validate(&self) -> Result<()> {
        if !self.strike.is_finite() || self.strike <= 0.0 {
            return Err(CoreError::InvalidLeg(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if self.quantity == 0 {
            return Err(CoreError::InvalidLeg("quantity must be non-zero".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(CoreError::InvalidLeg(format!(
                "multiplier must be positive, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_option_type_parse() {
        assert_eq!("CALL".parse::<OptionType>().unwrap(), OptionType::Call);
        assert_eq!("p".parse::<OptionType>().unwrap(), OptionType::Put);
        assert!("straddle".parse::<OptionType>().is_err());
    }

    #[test]
    fn test_time_to_expiry_floor() {
        let now = Utc::now();
        let expired = Leg::new(OptionType::Put, 100.0, now - Duration::days(2), -1);
        assert!((expired.time_to_expiry(now) - 0.001).abs() < 1e-12);

        let leg = Leg::new(OptionType::Call, 100.0, now + Duration::days(365), 1);
        assert!((leg.time_to_expiry(now) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_days_to_expiry() {
        let now = Utc::now();
        let leg = Leg::new(OptionType::Call, 100.0, now + Duration::days(30), 1);
        assert_eq!(leg.days_to_expiry(now), 30);

        let leg = Leg::new(OptionType::Call, 100.0, now - Duration::days(1), 1);
        assert_eq!(leg.days_to_expiry(now), 0);
    }

    #[test]
    fn test_scale_and_validate() {
        let now = Utc::now();
        let leg = Leg::new(OptionType::Put, 4000.0, now, -2).with_multiplier(50.0);
        assert_eq!(leg.scale(), -100.0);
        assert!(leg.validate().is_ok());

        let bad = Leg::new(OptionType::Put, 0.0, now, 1);
        assert!(bad.validate().is_err());

        let flat = Leg::new(OptionType::Put, 10.0, now, 0);
        assert!(flat.validate().is_err());
    }

    #[test]
    fn test_leg_deserialize_defaults() {
        let json = r#"{
            "strike": 450.0,
            "expiration": "2030-01-18T21:00:00Z",
            "option_type": "put",
            "quantity": -1
        }"#;
        let leg: Leg = serde_json::from_str(json).unwrap();
        assert_eq!(leg.multiplier, DEFAULT_MULTIPLIER);
        assert!(leg.implied_volatility.is_none());
    }
}
