//! Exit trigger evaluation and exit planning.

use std::fmt;

use serde::{Deserialize, Serialize};
use thetawatch_core::{Position, StrategyTag};

use crate::health::PositionMetrics;

/// Trigger priority. Ordering is most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitPriority {
    Emergency,
    Urgent,
    High,
    Medium,
    Low,
}

impl fmt::Display for ExitPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Emergency => "EMERGENCY",
            Self::Urgent => "URGENT",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

/// Rule that produced a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTriggerKind {
    ZeroDte,
    ProfitTarget,
    ManagementWindow,
    MajorLoss,
    LateEntryWeek,
    TestedSide,
}

/// What the trigger asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitAction {
    Close,
    TakeProfit,
    DefendOrClose,
    EvaluateRoll,
    Adjust,
    Monitor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTrigger {
    pub kind: ExitTriggerKind,
    pub priority: ExitPriority,
    pub action: ExitAction,
    pub message: String,
}

impl ExitTrigger {
    fn new(
        kind: ExitTriggerKind,
        priority: ExitPriority,
        action: ExitAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            priority,
            action,
            message: message.into(),
        }
    }

    fn is_risk_management(&self) -> bool {
        matches!(
            self.kind,
            ExitTriggerKind::ZeroDte | ExitTriggerKind::MajorLoss | ExitTriggerKind::TestedSide
        ) || self.action == ExitAction::DefendOrClose
    }
}

/// Exit rule thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    /// P&L % that triggers an urgent profit take.
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,

    /// Management window in DTE.
    #[serde(default = "default_management_dte")]
    pub management_dte: i64,

    /// Inside the window: close at or above this profit.
    #[serde(default = "default_window_profit_pct")]
    pub window_profit_pct: f64,

    /// Inside the window: defend or close at or below this loss.
    #[serde(default = "default_window_loss_pct")]
    pub window_loss_pct: f64,

    /// Loss % treated as a major loss at any DTE.
    #[serde(default = "default_major_loss_pct")]
    pub major_loss_pct: f64,

    /// Entry week at or after which an LT112 entry is monitored.
    #[serde(default = "default_late_entry_week")]
    pub late_entry_week: u8,
}

fn default_profit_target_pct() -> f64 {
    50.0
}

fn default_management_dte() -> i64 {
    21
}

fn default_window_profit_pct() -> f64 {
    25.0
}

fn default_window_loss_pct() -> f64 {
    -25.0
}

fn default_major_loss_pct() -> f64 {
    -100.0
}

fn default_late_entry_week() -> u8 {
    3
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_target_pct: default_profit_target_pct(),
            management_dte: default_management_dte(),
            window_profit_pct: default_window_profit_pct(),
            window_loss_pct: default_window_loss_pct(),
            major_loss_pct: default_major_loss_pct(),
            late_entry_week: default_late_entry_week(),
        }
    }
}

/// One position's place in the exit plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedExit {
    pub symbol: String,
    pub strategy: Option<StrategyTag>,
    pub metrics: PositionMetrics,
    /// Most urgent trigger, if any.
    pub primary: Option<ExitTrigger>,
    pub triggers: Vec<ExitTrigger>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSummary {
    pub total_positions: usize,
    pub needing_action: usize,
    pub profit_targets_hit: usize,
    pub risk_management_triggered: usize,
}

/// Positions grouped by how soon they need attention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    /// EMERGENCY or URGENT.
    pub immediate: Vec<PlannedExit>,
    /// HIGH.
    pub today: Vec<PlannedExit>,
    /// MEDIUM.
    pub this_week: Vec<PlannedExit>,
    /// LOW or no trigger.
    pub monitor: Vec<PlannedExit>,
    pub summary: ExitSummary,
}

/// Rule-based exit trigger evaluator.
#[derive(Debug, Clone, Default)]
pub struct ExitEvaluator {
    config: ExitConfig,
}

impl ExitEvaluator {
    #[must_use]
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// Evaluate every rule and return the triggers, most urgent first.
    ///
    /// The sort is stable, so triggers of equal priority keep rule order.
    #[must_use]
    pub fn evaluate(&self, position: &Position, metrics: &PositionMetrics) -> Vec<ExitTrigger> {
        let cfg = &self.config;
        let dte = metrics.days_to_expiry;
        let pnl = metrics.pnl_percent;
        let mut triggers = Vec::new();

        if dte <= 0 {
            triggers.push(ExitTrigger::new(
                ExitTriggerKind::ZeroDte,
                ExitPriority::Emergency,
                ExitAction::Close,
                "Expires today: close before the bell",
            ));
        }

        if pnl >= cfg.profit_target_pct {
            triggers.push(ExitTrigger::new(
                ExitTriggerKind::ProfitTarget,
                ExitPriority::Urgent,
                ExitAction::TakeProfit,
                format!("{pnl:.0}% profit reached {:.0}% target", cfg.profit_target_pct),
            ));
        }

        if dte > 0 && dte <= cfg.management_dte {
            let trigger = if pnl >= cfg.window_profit_pct {
                ExitTrigger::new(
                    ExitTriggerKind::ManagementWindow,
                    ExitPriority::High,
                    ExitAction::Close,
                    format!("{dte} DTE with {pnl:.0}% profit: close"),
                )
            } else if pnl <= cfg.window_loss_pct {
                ExitTrigger::new(
                    ExitTriggerKind::ManagementWindow,
                    ExitPriority::High,
                    ExitAction::DefendOrClose,
                    format!("{dte} DTE with {pnl:.0}% loss: defend or close"),
                )
            } else {
                ExitTrigger::new(
                    ExitTriggerKind::ManagementWindow,
                    ExitPriority::Medium,
                    ExitAction::EvaluateRoll,
                    format!("{dte} DTE: evaluate roll"),
                )
            };
            triggers.push(trigger);
        }

        if pnl <= cfg.major_loss_pct {
            triggers.push(ExitTrigger::new(
                ExitTriggerKind::MajorLoss,
                ExitPriority::High,
                ExitAction::Close,
                format!("{pnl:.0}% loss beyond {:.0}% limit", cfg.major_loss_pct),
            ));
        }

        if position.strategy == Some(StrategyTag::Lt112) {
            if let Some(week) = position.entry.entry_week {
                if week >= cfg.late_entry_week {
                    triggers.push(ExitTrigger::new(
                        ExitTriggerKind::LateEntryWeek,
                        ExitPriority::Low,
                        ExitAction::Monitor,
                        format!("LT112 entered in week {week}"),
                    ));
                }
            }
        }

        let two_sided = position.strategy.map(|s| s.is_two_sided()).unwrap_or(false);
        if let (true, Some(side)) = (two_sided, position.entry.tested_side) {
            let (priority, message) = if position.entry.management_plan {
                (ExitPriority::Medium, format!("{side:?} side tested: follow management plan"))
            } else {
                (ExitPriority::High, format!("{side:?} side tested with no management plan"))
            };
            triggers.push(ExitTrigger::new(
                ExitTriggerKind::TestedSide,
                priority,
                ExitAction::Adjust,
                message,
            ));
        }

        triggers.sort_by_key(|t| t.priority);
        triggers
    }

    /// Bucket positions by their primary trigger.
    #[must_use]
    pub fn plan<'a, I>(&self, positions: I) -> ExitPlan
    where
        I: IntoIterator<Item = (&'a Position, PositionMetrics)>,
    {
        let mut plan = ExitPlan::default();

        for (position, metrics) in positions {
            let triggers = self.evaluate(position, &metrics);
            let primary = triggers.first().cloned();

            plan.summary.total_positions += 1;
            if triggers.iter().any(|t| t.kind == ExitTriggerKind::ProfitTarget) {
                plan.summary.profit_targets_hit += 1;
            }
            if triggers.iter().any(ExitTrigger::is_risk_management) {
                plan.summary.risk_management_triggered += 1;
            }

            let priority = primary.as_ref().map(|t| t.priority);
            let entry = PlannedExit {
                symbol: position.symbol.clone(),
                strategy: position.strategy,
                metrics,
                primary,
                triggers,
            };

            match priority {
                Some(ExitPriority::Emergency | ExitPriority::Urgent) => plan.immediate.push(entry),
                Some(ExitPriority::High) => plan.today.push(entry),
                Some(ExitPriority::Medium) => plan.this_week.push(entry),
                Some(ExitPriority::Low) | None => plan.monitor.push(entry),
            }
        }

        plan.summary.needing_action =
            plan.immediate.len() + plan.today.len() + plan.this_week.len();
        plan
    }
}
