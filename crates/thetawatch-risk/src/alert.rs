//! Alerts and the bounded alert log.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity. Ordered so `Critical > Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric that breached its band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Delta,
    Gamma,
    Theta,
    Vega,
    RiskScore,
}

impl AlertType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Gamma => "gamma",
            Self::Theta => "theta",
            Self::Vega => "vega",
            Self::RiskScore => "risk_score",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    /// Position symbol, or `None` for a portfolio-level breach.
    pub symbol: Option<String>,
    pub value: f64,
    /// Band level that was crossed.
    pub threshold: f64,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    #[must_use]
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        symbol: Option<String>,
        value: f64,
        threshold: f64,
        raised_at: DateTime<Utc>,
    ) -> Self {
        let scope = symbol.as_deref().unwrap_or("portfolio");
        let message = format!(
            "{} {} {} {:.2} breached {:.2}",
            scope, alert_type, severity, value, threshold
        );
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            symbol,
            value,
            threshold,
            message,
            raised_at,
        }
    }

    #[must_use]
    pub fn is_portfolio(&self) -> bool {
        self.symbol.is_none()
    }
}

/// Bounded alert history.
///
/// When the log grows past `max` it keeps only the newest `max / 2`
/// entries, so a log sitting at the boundary does not trim on every push.
#[derive(Debug, Clone)]
pub struct AlertLog {
    max: usize,
    alerts: VecDeque<Alert>,
}

impl AlertLog {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            alerts: VecDeque::new(),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        self.alerts.push_back(alert);
        if self.alerts.len() > self.max {
            let keep = (self.max / 2).max(1);
            let drop = self.alerts.len() - keep;
            self.alerts.drain(..drop);
        }
    }

    /// Alerts oldest first, optionally filtered by type.
    #[must_use]
    pub fn alerts(&self, alert_type: Option<AlertType>) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| alert_type.map_or(true, |t| a.alert_type == t))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}
