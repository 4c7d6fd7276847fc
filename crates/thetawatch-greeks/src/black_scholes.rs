//! Black-Scholes-Merton adapter.

use serde::{Deserialize, Serialize};
use thetawatch_core::OptionType;

use crate::calculator::{GreeksCalculator, LegGreeks, PricingInput};
use crate::error::{CalculationError, CalculationResult};
use crate::normal::{cdf, pdf};

const DAYS_PER_YEAR: f64 = 365.0;

/// European option Greeks under Black-Scholes-Merton with a continuous
/// dividend yield.
///
/// Vega and rho are reported per one percentage point; theta per calendar
/// day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackScholesCalculator {
    pub risk_free_rate: f64,
}

impl BlackScholesCalculator {
    #[must_use]
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }
}

impl Default for BlackScholesCalculator {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl GreeksCalculator for BlackScholesCalculator {
    fn calculate(&self, input: &PricingInput) -> CalculationResult<LegGreeks> {
        input.validate()?;

        let s = input.spot;
        let k = input.strike;
        let t = input.time_to_expiry;
        let v = input.volatility;
        let q = input.dividend_yield;
        let r = self.risk_free_rate;

        let sqrt_t = t.sqrt();
        let d1 = ((s / k).ln() + (r - q + 0.5 * v * v) * t) / (v * sqrt_t);
        let d2 = d1 - v * sqrt_t;
        let disc_q = (-q * t).exp();
        let disc_r = (-r * t).exp();
        let nd1_prime = pdf(d1);

        let gamma = disc_q * nd1_prime / (s * v * sqrt_t);
        let vega = s * disc_q * nd1_prime * sqrt_t / 100.0;
        let decay = -s * nd1_prime * v * disc_q / (2.0 * sqrt_t);

        let greeks = match input.option_type {
            OptionType::Call => {
                let nd1 = cdf(d1);
                let nd2 = cdf(d2);
                LegGreeks {
                    delta: disc_q * nd1,
                    gamma,
                    theta: (decay + q * s * nd1 * disc_q - r * k * disc_r * nd2) / DAYS_PER_YEAR,
                    vega,
                    rho: k * t * disc_r * nd2 / 100.0,
                    theoretical_price: s * disc_q * nd1 - k * disc_r * nd2,
                }
            }
            OptionType::Put => {
                let nnd1 = cdf(-d1);
                let nnd2 = cdf(-d2);
                LegGreeks {
                    delta: -disc_q * nnd1,
                    gamma,
                    theta: (decay - q * s * nnd1 * disc_q + r * k * disc_r * nnd2) / DAYS_PER_YEAR,
                    vega,
                    rho: -k * t * disc_r * nnd2 / 100.0,
                    theoretical_price: k * disc_r * nnd2 - s * disc_q * nnd1,
                }
            }
        };

        check_finite(&greeks)?;
        Ok(greeks)
    }
}

fn check_finite(g: &LegGreeks) -> CalculationResult<()> {
    let fields = [
        ("delta", g.delta),
        ("gamma", g.gamma),
        ("theta", g.theta),
        ("vega", g.vega),
        ("rho", g.rho),
        ("theoretical_price", g.theoretical_price),
    ];
    match fields.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, _)) => Err(CalculationError::NonFinite(*name)),
        None => Ok(()),
    }
}
