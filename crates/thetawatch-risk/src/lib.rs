//! Portfolio risk controls for thetawatch.
//!
//! - [`ThresholdMonitor`]: warning/critical bands on position and portfolio Greeks
//! - [`CorrelationTracker`]: per-group position limits by account phase
//! - [`EmergencyStop`]: latching stop shared with every collaborator
//! - [`AlertLog`]: bounded alert history

pub mod alert;
pub mod correlation;
pub mod emergency_stop;
pub mod error;
pub mod threshold;

pub use alert::{Alert, AlertLog, AlertSeverity, AlertType};
pub use correlation::{
    underlying_ticker, AddDecision, ConcentrationLevel, ConcentrationReport, CorrelationConfig,
    CorrelationGroup, CorrelationTracker, GroupViolation, PhaseLimit,
};
pub use emergency_stop::{EmergencyStop, StopReason};
pub use error::{RiskError, RiskResult};
pub use threshold::{classify, Band, BreachRule, GreekBands, ThresholdConfig, ThresholdMonitor};
