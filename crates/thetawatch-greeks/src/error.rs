//! Pricing input errors.

use thiserror::Error;

/// Invalid pricing input. The affected leg is skipped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalculationError {
    #[error("spot price must be positive: {0}")]
    NonPositiveSpot(f64),

    #[error("strike must be positive: {0}")]
    NonPositiveStrike(f64),

    #[error("time to expiry must be positive: {0}")]
    NonPositiveTime(f64),

    #[error("volatility must be positive: {0}")]
    NonPositiveVolatility(f64),

    #[error("non-finite pricing output for {0}")]
    NonFinite(&'static str),
}

pub type CalculationResult<T> = Result<T, CalculationError>;
