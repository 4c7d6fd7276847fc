//! Position error types.

use thetawatch_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] CoreError),

    #[error("Position not subscribed: {0}")]
    NotSubscribed(String),

    #[error("No tick for {symbol} in {age_ms}ms")]
    Stale { symbol: String, age_ms: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Aggregator task is not running")]
    ChannelClosed,
}

pub type PositionResult<T> = Result<T, PositionError>;
