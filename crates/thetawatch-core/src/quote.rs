//! Market quote types.
//!
//! `Tick` is the raw feed update with every price optional. It is resolved
//! into a `Quote` exactly once, at ingestion, so downstream code never has
//! to re-check which prices were present.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw market update from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Underlying symbol.
    pub symbol: String,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub mid: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
}

impl Tick {
    /// Create a tick carrying only a mid price.
    #[must_use]
    pub fn with_mid(symbol: impl Into<String>, mid: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            bid: None,
            ask: None,
            mid: Some(mid),
            last: None,
        }
    }

    /// Resolve the spot price: mid, else last, else bid.
    ///
    /// Returns `None` when none of them is present. A present but
    /// non-positive price is passed through; pricing rejects it per leg.
    #[must_use]
    pub fn resolve(&self) -> Option<Quote> {
        let spot = self.mid.or(self.last).or(self.bid)?.to_f64()?;
        Some(Quote {
            symbol: self.symbol.clone(),
            spot,
            timestamp: self.timestamp,
        })
    }
}

/// A tick resolved to a single spot price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Underlying symbol.
    pub symbol: String,
    /// Resolved spot price.
    pub spot: f64,
    /// Exchange timestamp of the originating tick.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(bid: Option<Decimal>, mid: Option<Decimal>, last: Option<Decimal>) -> Tick {
        Tick {
            symbol: "SPY".to_string(),
            timestamp: Utc::now(),
            bid,
            ask: None,
            mid,
            last,
        }
    }

    #[test]
    fn test_resolve_prefers_mid() {
        let q = tick(Some(dec!(99)), Some(dec!(100)), Some(dec!(101)))
            .resolve()
            .unwrap();
        assert_eq!(q.spot, 100.0);
    }

    #[test]
    fn test_resolve_falls_back_to_last_then_bid() {
        let q = tick(Some(dec!(99)), None, Some(dec!(101))).resolve().unwrap();
        assert_eq!(q.spot, 101.0);

        let q = tick(Some(dec!(99)), None, None).resolve().unwrap();
        assert_eq!(q.spot, 99.0);
    }

    #[test]
    fn test_resolve_empty_tick() {
        assert!(tick(None, None, None).resolve().is_none());
    }

    #[test]
    fn test_tick_json_missing_prices() {
        let json = r#"{"symbol":"QQQ","timestamp":"2026-01-02T15:00:00Z","last":"412.5"}"#;
        let t: Tick = serde_json::from_str(json).unwrap();
        assert_eq!(t.resolve().unwrap().spot, 412.5);
    }
}
