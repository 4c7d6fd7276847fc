//! Greeks calculation for thetawatch.
//!
//! Pricing is consumed through the [`GreeksCalculator`] trait so that the
//! aggregator never depends on a particular model. The default adapter is
//! [`BlackScholesCalculator`] (Black-Scholes-Merton with continuous
//! dividend yield).

pub mod black_scholes;
pub mod calculator;
pub mod error;
mod normal;

pub use black_scholes::BlackScholesCalculator;
pub use calculator::{GreeksCalculator, LegGreeks, PricingInput};
pub use error::{CalculationError, CalculationResult};
