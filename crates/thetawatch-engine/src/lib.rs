//! thetawatch risk engine.
//!
//! Orchestrates all components:
//! - Market feed ingestion and quote resolution
//! - Position Greeks aggregation
//! - Periodic threshold evaluation and alerting
//! - Correlation limits, exit planning and theta optimization

pub mod config;
pub mod engine;
pub mod error;

pub use config::{AppConfig, EngineConfig};
pub use engine::{EngineEvent, EngineStatus, RiskEngine};
pub use error::{EngineError, EngineResult};
