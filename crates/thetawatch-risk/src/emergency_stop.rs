//! Emergency stop latch.
//!
//! Once tripped the latch stays tripped until an operator resets it. It is
//! shared by reference (`Arc<EmergencyStop>`) with every collaborator that
//! needs to observe it; there is no process-global flag.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use thetawatch_telemetry::Metrics;
use tracing::{error, info, warn};

// ============================================================================
// StopReason
// ============================================================================

/// Why the latch was tripped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Portfolio risk score fell through its critical band.
    CriticalRiskScore {
        /// Score at the time of the trip.
        score: f64,
        /// Critical level that was breached.
        critical: f64,
    },
    /// Manual trip by an operator.
    Manual {
        /// Human-readable message.
        message: String,
    },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CriticalRiskScore { score, critical } => {
                write!(f, "Risk score {:.1} at or below critical {:.1}", score, critical)
            }
            Self::Manual { message } => write!(f, "Manual: {}", message),
        }
    }
}

// ============================================================================
// EmergencyStop
// ============================================================================

/// Latching emergency stop.
///
/// Thread-safe: share via `Arc<EmergencyStop>`.
pub struct EmergencyStop {
    tripped: AtomicBool,
    /// Unix milliseconds, 0 when not tripped.
    tripped_at: AtomicI64,
    reason: RwLock<Option<StopReason>>,
}

impl Default for EmergencyStop {
    fn default() -> Self {
        Self::new()
    }
}

impl EmergencyStop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tripped: AtomicBool::new(false),
            tripped_at: AtomicI64::new(0),
            reason: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Trip the latch.
    ///
    /// Returns `true` if this call tripped it. A second trip keeps the
    /// original reason.
    pub fn trip(&self, reason: StopReason) -> bool {
        if self
            .tripped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.tripped_at
                .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());
            Metrics::emergency_stop(true);
            error!(reason = %reason, "EMERGENCY STOP TRIPPED");
            true
        } else {
            warn!(new_reason = %reason, "Emergency stop already active, ignoring trip");
            false
        }
    }

    /// When the latch was tripped, if it is active.
    #[must_use]
    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        if !self.is_active() {
            return None;
        }
        match self.tripped_at.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        if self.is_active() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    /// Clear the latch. Operator action only; nothing in the engine calls this.
    pub fn reset(&self) {
        if self.is_active() {
            let previous = self.reason.read().clone();
            info!(previous_reason = ?previous, "Emergency stop manually reset");

            self.tripped.store(false, Ordering::SeqCst);
            self.tripped_at.store(0, Ordering::SeqCst);
            *self.reason.write() = None;
            Metrics::emergency_stop(false);
        }
    }
}

impl std::fmt::Debug for EmergencyStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyStop")
            .field("active", &self.is_active())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_inactive() {
        let stop = EmergencyStop::new();
        assert!(!stop.is_active());
        assert!(stop.reason().is_none());
        assert!(stop.tripped_at().is_none());
    }

    #[test]
    fn test_trip_latches_first_reason() {
        let stop = EmergencyStop::new();
        assert!(stop.trip(StopReason::Manual {
            message: "first".to_string()
        }));
        assert!(!stop.trip(StopReason::CriticalRiskScore {
            score: 10.0,
            critical: 30.0
        }));

        assert!(stop.is_active());
        assert!(stop.tripped_at().is_some());
        assert_eq!(
            stop.reason(),
            Some(StopReason::Manual {
                message: "first".to_string()
            })
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let stop = EmergencyStop::new();
        stop.trip(StopReason::Manual {
            message: "ops".to_string(),
        });
        stop.reset();

        assert!(!stop.is_active());
        assert!(stop.reason().is_none());
        assert!(stop.tripped_at().is_none());

        // Can be tripped again after a reset.
        assert!(stop.trip(StopReason::Manual {
            message: "again".to_string()
        }));
    }

    #[test]
    fn test_reason_display() {
        let reason = StopReason::CriticalRiskScore {
            score: 12.0,
            critical: 30.0,
        };
        assert_eq!(reason.to_string(), "Risk score 12.0 at or below critical 30.0");
        assert_eq!(
            StopReason::Manual {
                message: "halt".to_string()
            }
            .to_string(),
            "Manual: halt"
        );
    }
}
