//! Prometheus metrics and structured logging for thetawatch.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus collectors for tick flow, cache efficiency, portfolio
//!   Greeks, alerts and feed state

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
