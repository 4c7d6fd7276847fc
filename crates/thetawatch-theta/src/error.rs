//! Theta optimizer error types.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThetaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account value must be positive, got {0}")]
    InvalidAccountValue(Decimal),

    #[error("VIX level must be a non-negative number, got {0}")]
    InvalidVix(f64),
}

pub type ThetaResult<T> = Result<T, ThetaError>;
