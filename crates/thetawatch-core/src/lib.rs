//! Core domain types for the thetawatch options risk engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Leg`, `Position`: option positions mirrored from the broker feed
//! - `Tick`, `Quote`: raw market updates and their resolved spot price
//! - `GreeksSnapshot`, `PortfolioSnapshot`: immutable computation results
//! - `ObserverRegistry`: isolated fan-out for push notifications

pub mod error;
pub mod greeks;
pub mod observer;
pub mod option;
pub mod position;
pub mod quote;

pub use error::{CoreError, Result};
pub use greeks::{Greeks, GreeksSnapshot, PortfolioSnapshot, RiskBucket};
pub use observer::{DispatchReport, ObserverError, ObserverId, ObserverRegistry, ObserverResult};
pub use option::{Leg, OptionType, DEFAULT_MULTIPLIER};
pub use position::{EntryMetadata, Position, StrategyTag, TestedSide};
pub use quote::{Quote, Tick};
