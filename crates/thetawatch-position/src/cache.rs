//! Short-lived Greeks cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thetawatch_core::GreeksSnapshot;

/// Per-symbol snapshot cache with a fixed TTL.
///
/// An entry is reusable only while `now - computed_at < ttl`. Expired
/// entries are left in place and replaced on the next insert.
#[derive(Debug)]
pub struct GreeksCache {
    ttl_ms: u64,
    entries: HashMap<String, GreeksSnapshot>,
    hits: u64,
    misses: u64,
}

impl GreeksCache {
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a fresh snapshot, counting the hit or miss.
    pub fn lookup(&mut self, symbol: &str, now: DateTime<Utc>) -> Option<GreeksSnapshot> {
        match self.entries.get(symbol) {
            Some(snapshot) if snapshot.is_fresh(now, self.ttl_ms) => {
                self.hits += 1;
                Some(snapshot.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, snapshot: GreeksSnapshot) {
        self.entries.insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn remove(&mut self, symbol: &str) {
        self.entries.remove(symbol);
    }

    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
