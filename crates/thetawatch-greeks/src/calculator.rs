//! Adapter contract between the aggregator and a pricing model.

use serde::{Deserialize, Serialize};
use thetawatch_core::{Greeks, OptionType};

use crate::error::{CalculationError, CalculationResult};

/// Inputs for pricing one option contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingInput {
    pub spot: f64,
    pub strike: f64,
    /// Years.
    pub time_to_expiry: f64,
    /// Annualized, e.g. 0.25.
    pub volatility: f64,
    pub option_type: OptionType,
    /// Continuous dividend yield.
    pub dividend_yield: f64,
}

impl PricingInput {
    /// Reject non-positive spot, strike, time and volatility.
    pub fn validate(&self) -> CalculationResult<()> {
        if !(self.spot > 0.0) {
            return Err(CalculationError::NonPositiveSpot(self.spot));
        }
        if !(self.strike > 0.0) {
            return Err(CalculationError::NonPositiveStrike(self.strike));
        }
        if !(self.time_to_expiry > 0.0) {
            return Err(CalculationError::NonPositiveTime(self.time_to_expiry));
        }
        if !(self.volatility > 0.0) {
            return Err(CalculationError::NonPositiveVolatility(self.volatility));
        }
        Ok(())
    }
}

/// Per-contract (unscaled) Greeks and theoretical price.
///
/// Theta is per calendar day and negative for a long option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    pub theoretical_price: f64,
}

impl LegGreeks {
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

/// Pure pricing function.
///
/// Implementations must be deterministic for equal inputs and must reject
/// invalid inputs with [`CalculationError`] instead of returning garbage.
pub trait GreeksCalculator: Send + Sync {
    fn calculate(&self, input: &PricingInput) -> CalculationResult<LegGreeks>;
}

impl<T: GreeksCalculator + ?Sized> GreeksCalculator for std::sync::Arc<T> {
    fn calculate(&self, input: &PricingInput) -> CalculationResult<LegGreeks> {
        (**self).calculate(input)
    }
}
