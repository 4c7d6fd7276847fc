//! Aggregator configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PositionError, PositionResult};

/// Position aggregator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// How long a computed snapshot may be reused (ms).
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// A symbol is stale after `cache_ttl_ms * staleness_multiplier` without a tick.
    #[serde(default = "default_staleness_multiplier")]
    pub staleness_multiplier: u32,

    /// Volatility used for legs without their own implied volatility.
    #[serde(default = "default_volatility")]
    pub default_volatility: f64,

    /// Annualized risk-free rate for the default adapter.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Continuous dividend yield passed to the adapter.
    #[serde(default)]
    pub dividend_yield: f64,

    /// Snapshots kept per symbol and for the portfolio.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Actor mailbox capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_cache_ttl_ms() -> u64 {
    500
}

fn default_staleness_multiplier() -> u32 {
    5
}

fn default_volatility() -> f64 {
    0.25
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_history_limit() -> usize {
    500
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            staleness_multiplier: default_staleness_multiplier(),
            default_volatility: default_volatility(),
            risk_free_rate: default_risk_free_rate(),
            dividend_yield: 0.0,
            history_limit: default_history_limit(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AggregatorConfig {
    /// Staleness window in milliseconds.
    #[must_use]
    pub fn staleness_ms(&self) -> i64 {
        (self.cache_ttl_ms * u64::from(self.staleness_multiplier)) as i64
    }

    pub fn validate(&self) -> PositionResult<()> {
        if self.cache_ttl_ms == 0 {
            return Err(PositionError::InvalidConfig(
                "cache_ttl_ms must be positive".to_string(),
            ));
        }
        if self.staleness_multiplier == 0 {
            return Err(PositionError::InvalidConfig(
                "staleness_multiplier must be positive".to_string(),
            ));
        }
        if !(self.default_volatility > 0.0) {
            return Err(PositionError::InvalidConfig(format!(
                "default_volatility must be positive, got {}",
                self.default_volatility
            )));
        }
        if self.dividend_yield < 0.0 {
            return Err(PositionError::InvalidConfig(format!(
                "dividend_yield must not be negative, got {}",
                self.dividend_yield
            )));
        }
        if self.history_limit == 0 || self.channel_capacity == 0 {
            return Err(PositionError::InvalidConfig(
                "history_limit and channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
