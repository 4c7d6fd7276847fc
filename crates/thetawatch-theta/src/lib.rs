//! Theta income optimization for thetawatch.
//!
//! Scales per-bucket daily theta targets by VIX regime, measures the theta
//! the live book earns, and sizes recommendations for material shortfalls.

pub mod config;
pub mod error;
pub mod optimizer;

pub use config::{
    BucketEconomics, ContractEconomics, StrategyBucket, ThetaConfig, ThetaTargets, VixRegime,
};
pub use error::{ThetaError, ThetaResult};
pub use optimizer::{
    BucketTheta, CurrentTheta, Feasibility, OptimizationSummary, Recommendation, ThetaGap,
    ThetaInput, ThetaOptimizer,
};
