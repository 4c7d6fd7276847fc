//! Integration tests for thetawatch-engine.
//!
//! These tests drive a full engine through a mock feed:
//! - Subscription and tick flow into live Greeks
//! - Feed disconnect and reconnect handling
//! - Alerts, emergency stop and the pull API

pub mod common;
