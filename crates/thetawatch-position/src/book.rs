//! Owner state of the position aggregator.
//!
//! `PositionBook` is plain synchronous state: the actor in `aggregator`
//! owns one and is the only writer. Greeks computation is split out into
//! [`GreeksJob`] so it can run on a worker while the book keeps serving
//! other symbols.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use thetawatch_core::{Greeks, GreeksSnapshot, Leg, PortfolioSnapshot, Position, Quote};
use thetawatch_greeks::{CalculationError, GreeksCalculator, PricingInput};
use thetawatch_telemetry::Metrics;
use tracing::{debug, trace, warn};

use crate::cache::GreeksCache;
use crate::config::AggregatorConfig;
use crate::error::{PositionError, PositionResult};
use crate::portfolio;

// ============================================================================
// GreeksJob
// ============================================================================

/// Self-contained unit of work: price every leg of one position at one spot.
#[derive(Debug, Clone)]
pub struct GreeksJob {
    symbol: String,
    generation: u64,
    legs: Vec<Leg>,
    spot: f64,
    now: DateTime<Utc>,
    default_volatility: f64,
    dividend_yield: f64,
}

/// A leg the adapter rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct LegFailure {
    pub leg_index: usize,
    pub error: CalculationError,
}

/// Result of running a [`GreeksJob`].
#[derive(Debug, Clone)]
pub struct ComputeOutcome {
    pub symbol: String,
    /// Subscription generation the job was built from.
    pub generation: u64,
    /// `None` when every leg was rejected.
    pub snapshot: Option<GreeksSnapshot>,
    pub failures: Vec<LegFailure>,
}

impl GreeksJob {
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn spot(&self) -> f64 {
        self.spot
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Price each leg, scale by `quantity * multiplier` and sum.
    ///
    /// Legs with invalid inputs are skipped and reported; the rest still
    /// contribute.
    pub fn run(&self, calculator: &dyn GreeksCalculator) -> ComputeOutcome {
        let mut total = Greeks::default();
        let mut theoretical_value = 0.0;
        let mut legs_priced = 0;
        let mut failures = Vec::new();

        for (leg_index, leg) in self.legs.iter().enumerate() {
            let input = PricingInput {
                spot: self.spot,
                strike: leg.strike,
                time_to_expiry: leg.time_to_expiry(self.now),
                volatility: leg.implied_volatility.unwrap_or(self.default_volatility),
                option_type: leg.option_type,
                dividend_yield: self.dividend_yield,
            };

            match calculator.calculate(&input) {
                Ok(greeks) => {
                    let scale = leg.scale();
                    total = total + greeks.greeks().scale(scale);
                    theoretical_value += greeks.theoretical_price * scale;
                    legs_priced += 1;
                }
                Err(error) => {
                    warn!(
                        symbol = %self.symbol,
                        leg = leg_index,
                        error = %error,
                        "Skipping leg with invalid pricing input"
                    );
                    Metrics::calculation_failed(&self.symbol);
                    failures.push(LegFailure { leg_index, error });
                }
            }
        }

        let snapshot = (legs_priced > 0).then(|| GreeksSnapshot {
            symbol: self.symbol.clone(),
            delta: total.delta,
            gamma: total.gamma,
            theta: total.theta,
            vega: total.vega,
            rho: total.rho,
            theoretical_value,
            spot_price: self.spot,
            computed_at: self.now,
            legs_priced,
            legs_skipped: failures.len(),
        });

        ComputeOutcome {
            symbol: self.symbol.clone(),
            generation: self.generation,
            snapshot,
            failures,
        }
    }
}

// ============================================================================
// PositionBook
// ============================================================================

/// What to do with an incoming tick.
#[derive(Debug, Clone)]
pub enum TickDecision {
    /// Symbol is not subscribed.
    Ignored,
    /// A fresh cached snapshot was reused.
    Cached(GreeksSnapshot),
    /// The snapshot must be recomputed.
    Compute(GreeksJob),
}

#[derive(Debug, Clone)]
struct TrackedPosition {
    position: Position,
    generation: u64,
    subscribed_at: DateTime<Utc>,
    last_quote: Option<Quote>,
    last_tick_at: Option<DateTime<Utc>>,
}

impl TrackedPosition {
    fn last_seen(&self) -> DateTime<Utc> {
        self.last_tick_at.unwrap_or(self.subscribed_at)
    }
}

/// Authoritative position map, live snapshots and Greeks cache.
#[derive(Debug)]
pub struct PositionBook {
    config: AggregatorConfig,
    positions: HashMap<String, TrackedPosition>,
    snapshots: HashMap<String, GreeksSnapshot>,
    cache: GreeksCache,
    failing: HashSet<String>,
    vix: Option<f64>,
    next_generation: u64,
}

impl PositionBook {
    #[must_use]
    pub fn new(config: AggregatorConfig) -> Self {
        let cache = GreeksCache::new(config.cache_ttl_ms);
        Self {
            config,
            positions: HashMap::new(),
            snapshots: HashMap::new(),
            cache,
            failing: HashSet::new(),
            vix: None,
            next_generation: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    // === Subscription ===

    /// Start tracking a position. Replacing an existing position drops its
    /// cached Greeks so the new legs are priced on the next tick.
    ///
    /// Every subscribe starts a new generation; results of jobs built from
    /// an earlier generation are rejected by [`PositionBook::apply`].
    ///
    /// Returns `true` if a position was replaced.
    pub fn subscribe(&mut self, position: Position, now: DateTime<Utc>) -> PositionResult<bool> {
        position.validate()?;
        let symbol = position.symbol.clone();
        self.next_generation += 1;

        let previous = self.positions.insert(
            symbol.clone(),
            TrackedPosition {
                position,
                generation: self.next_generation,
                subscribed_at: now,
                last_quote: None,
                last_tick_at: None,
            },
        );

        let replaced = match previous {
            Some(previous) => {
                self.cache.remove(&symbol);
                self.snapshots.remove(&symbol);
                self.failing.remove(&symbol);
                // Keep the last quote so a refresh can reprice immediately.
                if let Some(tracked) = self.positions.get_mut(&symbol) {
                    tracked.last_quote = previous.last_quote;
                    tracked.last_tick_at = previous.last_tick_at;
                }
                true
            }
            None => false,
        };

        debug!(
            symbol = %symbol,
            replaced,
            generation = self.next_generation,
            "Position subscribed"
        );
        Ok(replaced)
    }

    /// Stop tracking a position and purge its snapshot and cache entry.
    pub fn unsubscribe(&mut self, symbol: &str) -> bool {
        let removed = self.positions.remove(symbol).is_some();
        self.snapshots.remove(symbol);
        self.cache.remove(symbol);
        self.failing.remove(symbol);
        if removed {
            debug!(symbol = %symbol, "Position unsubscribed");
        }
        removed
    }

    #[must_use]
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol).map(|tracked| &tracked.position)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().map(|tracked| &tracked.position)
    }

    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    // === Tick handling ===

    /// Record the latest quote for a subscribed symbol.
    ///
    /// Returns `false` if the symbol is not subscribed.
    pub fn record_quote(&mut self, quote: &Quote, now: DateTime<Utc>) -> bool {
        match self.positions.get_mut(&quote.symbol) {
            Some(tracked) => {
                tracked.last_quote = Some(quote.clone());
                tracked.last_tick_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Record a tick and decide whether its Greeks must be recomputed.
    pub fn prepare(&mut self, quote: &Quote, now: DateTime<Utc>) -> TickDecision {
        if !self.record_quote(quote, now) {
            trace!(symbol = %quote.symbol, "Tick for unsubscribed symbol");
            return TickDecision::Ignored;
        }
        self.decide(&quote.symbol, now)
    }

    /// Decide for the last recorded quote of `symbol`.
    pub fn decide(&mut self, symbol: &str, now: DateTime<Utc>) -> TickDecision {
        if !self.positions.contains_key(symbol) {
            return TickDecision::Ignored;
        }

        if let Some(snapshot) = self.cache.lookup(symbol, now) {
            Metrics::cache_hit();
            return TickDecision::Cached(snapshot);
        }
        Metrics::cache_miss();

        match self.job(symbol, now) {
            Some(job) => TickDecision::Compute(job),
            None => TickDecision::Ignored,
        }
    }

    /// Recompute job from the last known quote, bypassing the cache.
    #[must_use]
    pub fn refresh_job(&self, symbol: &str, now: DateTime<Utc>) -> Option<GreeksJob> {
        self.job(symbol, now)
    }

    fn job(&self, symbol: &str, now: DateTime<Utc>) -> Option<GreeksJob> {
        let tracked = self.positions.get(symbol)?;
        let quote = tracked.last_quote.as_ref()?;
        Some(GreeksJob {
            symbol: symbol.to_string(),
            generation: tracked.generation,
            legs: tracked.position.legs.clone(),
            spot: quote.spot,
            now,
            default_volatility: self.config.default_volatility,
            dividend_yield: self.config.dividend_yield,
        })
    }

    /// Install a computation result.
    ///
    /// Results for symbols unsubscribed or replaced while the job was
    /// running are discarded. When every leg failed the previous snapshot
    /// is kept and the symbol is marked as failing.
    pub fn apply(&mut self, outcome: ComputeOutcome) -> Option<GreeksSnapshot> {
        match self.positions.get(&outcome.symbol) {
            None => {
                debug!(symbol = %outcome.symbol, "Discarding result for unsubscribed symbol");
                return None;
            }
            Some(tracked) if tracked.generation != outcome.generation => {
                debug!(
                    symbol = %outcome.symbol,
                    job_generation = outcome.generation,
                    current_generation = tracked.generation,
                    "Discarding result computed for replaced legs"
                );
                return None;
            }
            Some(_) => {}
        }

        match outcome.snapshot {
            Some(snapshot) => {
                if outcome.failures.is_empty() {
                    self.failing.remove(&outcome.symbol);
                } else {
                    self.failing.insert(outcome.symbol.clone());
                }
                self.cache.insert(snapshot.clone());
                self.snapshots.insert(outcome.symbol, snapshot.clone());
                Some(snapshot)
            }
            None => {
                warn!(
                    symbol = %outcome.symbol,
                    failed_legs = outcome.failures.len(),
                    "No leg could be priced, keeping last snapshot"
                );
                self.failing.insert(outcome.symbol);
                None
            }
        }
    }

    /// Synchronous tick path: decide, compute inline, apply.
    pub fn on_tick(
        &mut self,
        quote: &Quote,
        calculator: &dyn GreeksCalculator,
        now: DateTime<Utc>,
    ) -> Option<GreeksSnapshot> {
        match self.prepare(quote, now) {
            TickDecision::Ignored => None,
            TickDecision::Cached(snapshot) => Some(snapshot),
            TickDecision::Compute(job) => self.apply(job.run(calculator)),
        }
    }

    // === Reads ===

    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<&GreeksSnapshot> {
        self.snapshots.get(symbol)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &GreeksSnapshot> {
        self.snapshots.values()
    }

    /// Symbols with no tick inside the staleness window.
    #[must_use]
    pub fn stale_symbols(&self, now: DateTime<Utc>) -> Vec<String> {
        let window = self.config.staleness_ms();
        let mut stale: Vec<String> = self
            .positions
            .iter()
            .filter(|(_, tracked)| (now - tracked.last_seen()).num_milliseconds() >= window)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Fail with [`PositionError::Stale`] if the symbol has gone quiet.
    pub fn check_fresh(&self, symbol: &str, now: DateTime<Utc>) -> PositionResult<()> {
        let tracked = self
            .positions
            .get(symbol)
            .ok_or_else(|| PositionError::NotSubscribed(symbol.to_string()))?;
        let age_ms = (now - tracked.last_seen()).num_milliseconds();
        if age_ms >= self.config.staleness_ms() {
            return Err(PositionError::Stale {
                symbol: symbol.to_string(),
                age_ms,
            });
        }
        Ok(())
    }

    /// Symbols whose last computation rejected at least one leg.
    #[must_use]
    pub fn failing_symbols(&self) -> Vec<String> {
        let mut failing: Vec<String> = self.failing.iter().cloned().collect();
        failing.sort();
        failing
    }

    #[must_use]
    pub fn cache(&self) -> &GreeksCache {
        &self.cache
    }

    pub fn set_vix(&mut self, vix: f64) {
        self.vix = Some(vix);
    }

    #[must_use]
    pub fn vix(&self) -> Option<f64> {
        self.vix
    }

    /// Recompute the portfolio aggregate from all live snapshots.
    #[must_use]
    pub fn portfolio(&self, now: DateTime<Utc>) -> PortfolioSnapshot {
        portfolio::aggregate(self.snapshots.values(), self.positions.len(), self.vix, now)
    }
}
