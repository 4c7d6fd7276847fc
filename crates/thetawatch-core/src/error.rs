//! Error types for thetawatch-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Position has no legs: {0}")]
    EmptyPosition(String),

    #[error("Invalid leg: {0}")]
    InvalidLeg(String),

    #[error("Invalid option type: {0}")]
    InvalidOptionType(String),

    #[error("Invalid strategy tag: {0}")]
    InvalidStrategy(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
