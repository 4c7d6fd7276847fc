//! Engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Position error: {0}")]
    Position(#[from] thetawatch_position::PositionError),

    #[error("Risk error: {0}")]
    Risk(#[from] thetawatch_risk::RiskError),

    #[error("Theta error: {0}")]
    Theta(#[from] thetawatch_theta::ThetaError),

    #[error("Feed error: {0}")]
    Feed(#[from] thetawatch_feed::FeedError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] thetawatch_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine stopped")]
    Stopped,
}

pub type EngineResult<T> = Result<T, EngineError>;
