//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Invalid threshold band for {metric}: {reason}")]
    InvalidBand { metric: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
