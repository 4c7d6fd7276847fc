//! Position aggregation for thetawatch.
//!
//! Mirrors subscribed option positions, recomputes their Greeks on market
//! ticks behind a short-lived cache, aggregates them into portfolio risk
//! metrics, and scores position health and exit urgency.
//!
//! # Key Components
//!
//! - [`spawn_aggregator`]: owner task for positions, snapshots and cache
//! - [`AggregatorHandle`]: async commands and sync reads of published state
//! - [`PositionBook`]: synchronous owner state (also usable without the actor)
//! - [`HealthScorer`]: 0-100 health score and primary action
//! - [`ExitEvaluator`]: prioritized exit triggers and exit plans

pub mod aggregator;
pub mod book;
pub mod cache;
pub mod config;
pub mod error;
pub mod exit;
pub mod health;
pub mod history;
pub mod portfolio;

pub use aggregator::{
    spawn_aggregator, AggregatorEvent, AggregatorHandle, AggregatorMsg, AggregatorStatus,
    AggregatorTask,
};
pub use book::{ComputeOutcome, GreeksJob, LegFailure, PositionBook, TickDecision};
pub use cache::GreeksCache;
pub use config::AggregatorConfig;
pub use error::{PositionError, PositionResult};
pub use exit::{
    ExitAction, ExitConfig, ExitEvaluator, ExitPlan, ExitPriority, ExitSummary, ExitTrigger,
    ExitTriggerKind, PlannedExit,
};
pub use health::{HealthAction, HealthConfig, HealthLevel, HealthScore, HealthScorer, PositionMetrics};
pub use history::{GreeksHistory, HistoryView};
pub use portfolio::{gamma_bucket, risk_score, vega_bucket, vega_regime_scale, DELTA_NEUTRAL_BAND};
