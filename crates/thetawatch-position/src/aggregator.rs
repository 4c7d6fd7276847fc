//! Position aggregator actor.
//!
//! A single task owns the [`PositionBook`] and is the only writer of
//! positions, snapshots and the Greeks cache. Greeks computation for a
//! symbol runs on the blocking pool, one job per symbol at a time, so a
//! slow or failing symbol never delays the others.
//!
//! # Owner vs Handle
//!
//! The owner publishes copies of its state into [`Shared`] after every
//! change (copy-on-publish). [`AggregatorHandle`] reads those copies
//! synchronously; it never waits on the owner for a read.
//!
//! # Coalescing
//!
//! While a job is in flight for a symbol, newer ticks for that symbol only
//! update its last quote and mark it pending. When the job lands, the
//! pending quote is handled like a fresh tick.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use thetawatch_core::{GreeksSnapshot, PortfolioSnapshot, Position, Quote};
use thetawatch_greeks::GreeksCalculator;
use thetawatch_telemetry::Metrics;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::book::{ComputeOutcome, GreeksJob, PositionBook, TickDecision};
use crate::config::AggregatorConfig;
use crate::error::{PositionError, PositionResult};
use crate::history::{GreeksHistory, HistoryView};

const EVENT_CAPACITY: usize = 1024;

// ============================================================================
// Messages and events
// ============================================================================

/// Messages for the aggregator actor.
#[derive(Debug)]
pub enum AggregatorMsg {
    Subscribe {
        position: Position,
        reply: oneshot::Sender<PositionResult<()>>,
    },
    Unsubscribe {
        symbol: String,
        reply: oneshot::Sender<bool>,
    },
    Tick(Quote),
    /// Recompute stale and failing symbols from their last known quote.
    RefreshStale,
    SetVix(f64),
    Shutdown,
}

/// Published after the owner changes state.
#[derive(Debug, Clone)]
pub enum AggregatorEvent {
    GreeksUpdated(GreeksSnapshot),
    PortfolioUpdated(Arc<PortfolioSnapshot>),
    PositionSubscribed(String),
    PositionUnsubscribed(String),
}

/// Point-in-time aggregator status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatorStatus {
    pub subscribed: usize,
    pub stale_symbols: Vec<String>,
    pub failing_symbols: Vec<String>,
    pub in_flight: usize,
    pub ticks_received: u64,
    pub ticks_ignored: u64,
    pub ticks_coalesced: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub computations: u64,
    pub vix: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// State published by the owner for lock-light reads.
struct Shared {
    live: DashMap<String, GreeksSnapshot>,
    positions: DashMap<String, Position>,
    portfolio: RwLock<Arc<PortfolioSnapshot>>,
    history: RwLock<GreeksHistory>,
    status: RwLock<AggregatorStatus>,
}

#[derive(Debug, Default)]
struct TickCounters {
    received: u64,
    ignored: u64,
    coalesced: u64,
    computations: u64,
}

// ============================================================================
// AggregatorTask
// ============================================================================

/// Aggregator actor task.
pub struct AggregatorTask {
    rx: mpsc::Receiver<AggregatorMsg>,
    results_tx: mpsc::UnboundedSender<ComputeOutcome>,
    results_rx: mpsc::UnboundedReceiver<ComputeOutcome>,
    book: PositionBook,
    calculator: Arc<dyn GreeksCalculator>,
    in_flight: HashSet<String>,
    pending: HashSet<String>,
    shared: Arc<Shared>,
    events: broadcast::Sender<AggregatorEvent>,
    counters: TickCounters,
    draining: bool,
}

impl AggregatorTask {
    /// Run until `Shutdown` (or every handle is dropped), then wait for
    /// in-flight jobs and the quotes coalesced behind them to land before
    /// returning.
    pub async fn run(mut self) {
        debug!("AggregatorTask started");

        loop {
            tokio::select! {
                msg = self.rx.recv(), if !self.draining => match msg {
                    Some(AggregatorMsg::Shutdown) | None => {
                        self.draining = true;
                        debug!(
                            in_flight = self.in_flight.len(),
                            pending = self.pending.len(),
                            "AggregatorTask draining"
                        );
                        if self.in_flight.is_empty() {
                            break;
                        }
                    }
                    Some(msg) => self.handle_message(msg),
                },
                Some(outcome) = self.results_rx.recv() => {
                    self.on_computed(outcome);
                    if self.draining && self.in_flight.is_empty() {
                        break;
                    }
                }
            }
        }

        debug!("AggregatorTask terminated");
    }

    fn handle_message(&mut self, msg: AggregatorMsg) {
        match msg {
            AggregatorMsg::Subscribe { position, reply } => {
                let result = self.on_subscribe(position);
                let _ = reply.send(result);
            }
            AggregatorMsg::Unsubscribe { symbol, reply } => {
                let removed = self.on_unsubscribe(&symbol);
                let _ = reply.send(removed);
            }
            AggregatorMsg::Tick(quote) => self.on_tick(quote),
            AggregatorMsg::RefreshStale => self.on_refresh_stale(),
            AggregatorMsg::SetVix(vix) => {
                debug!(vix, "VIX level updated");
                self.book.set_vix(vix);
                self.publish_portfolio();
            }
            AggregatorMsg::Shutdown => unreachable!("Shutdown handled in run()"),
        }
        self.publish_status();
    }

    fn on_subscribe(&mut self, position: Position) -> PositionResult<()> {
        let now = Utc::now();
        let symbol = position.symbol.clone();
        let replaced = self.book.subscribe(position.clone(), now)?;

        self.shared.positions.insert(symbol.clone(), position);
        if replaced {
            self.shared.live.remove(&symbol);
            if self.in_flight.contains(&symbol) {
                // The running job prices the old legs; reprice once it lands.
                self.pending.insert(symbol.clone());
            } else if let Some(job) = self.book.refresh_job(&symbol, now) {
                self.dispatch(job);
            }
        }

        info!(symbol = %symbol, replaced, "Position subscribed");
        let _ = self.events.send(AggregatorEvent::PositionSubscribed(symbol));
        self.publish_portfolio();
        Ok(())
    }

    fn on_unsubscribe(&mut self, symbol: &str) -> bool {
        let removed = self.book.unsubscribe(symbol);
        self.shared.positions.remove(symbol);
        self.shared.live.remove(symbol);
        self.shared.history.write().remove_symbol(symbol);
        self.pending.remove(symbol);

        if removed {
            info!(symbol = %symbol, "Position unsubscribed");
            let _ = self
                .events
                .send(AggregatorEvent::PositionUnsubscribed(symbol.to_string()));
            self.publish_portfolio();
        }
        removed
    }

    fn on_tick(&mut self, quote: Quote) {
        let now = Utc::now();
        self.counters.received += 1;
        Metrics::tick("received");

        if self.in_flight.contains(&quote.symbol) {
            if self.book.record_quote(&quote, now) {
                self.counters.coalesced += 1;
                Metrics::tick("coalesced");
                self.pending.insert(quote.symbol);
            } else {
                self.counters.ignored += 1;
                Metrics::tick("ignored");
            }
            return;
        }

        let decision = self.book.prepare(&quote, now);
        self.act(decision);
    }

    fn act(&mut self, decision: TickDecision) {
        match decision {
            TickDecision::Ignored => {
                self.counters.ignored += 1;
                Metrics::tick("ignored");
            }
            TickDecision::Cached(snapshot) => {
                Metrics::tick("processed");
                debug!(symbol = %snapshot.symbol, "Reusing cached Greeks");
            }
            TickDecision::Compute(job) => {
                Metrics::tick("processed");
                self.dispatch(job);
            }
        }
    }

    fn on_refresh_stale(&mut self) {
        let now = Utc::now();
        let stale = self.book.stale_symbols(now);
        Metrics::stale_symbols(stale.len());
        if !stale.is_empty() {
            debug!(symbols = ?stale, "Stale symbols");
        }

        let mut candidates: Vec<String> = stale;
        candidates.extend(self.book.failing_symbols());
        candidates.sort();
        candidates.dedup();

        for symbol in candidates {
            if self.in_flight.contains(&symbol) {
                continue;
            }
            if let Some(job) = self.book.refresh_job(&symbol, now) {
                self.dispatch(job);
            }
        }
    }

    fn dispatch(&mut self, job: GreeksJob) {
        let symbol = job.symbol().to_string();
        let generation = job.generation();
        self.in_flight.insert(symbol.clone());

        let calculator = Arc::clone(&self.calculator);
        let results = self.results_tx.clone();

        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let outcome = match catch_unwind(AssertUnwindSafe(|| job.run(calculator.as_ref()))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(symbol = %symbol, "Greeks calculator panicked");
                    ComputeOutcome {
                        symbol,
                        generation,
                        snapshot: None,
                        failures: Vec::new(),
                    }
                }
            };
            Metrics::recompute_latency(started.elapsed().as_secs_f64());
            // Receiver lives as long as the task; a send error means teardown.
            let _ = results.send(outcome);
        });
    }

    fn on_computed(&mut self, outcome: ComputeOutcome) {
        let symbol = outcome.symbol.clone();
        self.in_flight.remove(&symbol);
        self.counters.computations += 1;

        if let Some(snapshot) = self.book.apply(outcome) {
            self.shared.history.write().push_symbol(snapshot.clone());
            self.shared.live.insert(symbol.clone(), snapshot.clone());
            let _ = self.events.send(AggregatorEvent::GreeksUpdated(snapshot));
            self.publish_portfolio();
        }

        if self.pending.remove(&symbol) {
            let decision = self.book.decide(&symbol, Utc::now());
            self.act(decision);
        }

        self.publish_status();
    }

    fn publish_portfolio(&mut self) {
        let portfolio = Arc::new(self.book.portfolio(Utc::now()));

        Metrics::portfolio(
            portfolio.delta,
            portfolio.gamma,
            portfolio.theta,
            portfolio.vega,
            portfolio.rho,
            portfolio.risk_score,
        );
        Metrics::subscribed_positions(portfolio.position_count);

        self.shared
            .history
            .write()
            .push_portfolio(portfolio.as_ref().clone());
        *self.shared.portfolio.write() = Arc::clone(&portfolio);
        let _ = self.events.send(AggregatorEvent::PortfolioUpdated(portfolio));
    }

    fn publish_status(&self) {
        let now = Utc::now();
        let cache = self.book.cache();
        let status = AggregatorStatus {
            subscribed: self.book.len(),
            stale_symbols: self.book.stale_symbols(now),
            failing_symbols: self.book.failing_symbols(),
            in_flight: self.in_flight.len(),
            ticks_received: self.counters.received,
            ticks_ignored: self.counters.ignored,
            ticks_coalesced: self.counters.coalesced,
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            computations: self.counters.computations,
            vix: self.book.vix(),
            updated_at: Some(now),
        };
        *self.shared.status.write() = status;
    }
}

// ============================================================================
// AggregatorHandle
// ============================================================================

/// Handle for interacting with the aggregator actor.
///
/// Async methods send messages to the owner; sync methods read the last
/// published state.
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<AggregatorMsg>,
    shared: Arc<Shared>,
    events: broadcast::Sender<AggregatorEvent>,
}

impl AggregatorHandle {
    // === Async methods (send to owner) ===

    /// Register a position. Fails if it has no legs or a malformed leg.
    pub async fn subscribe(&self, position: Position) -> PositionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AggregatorMsg::Subscribe { position, reply }).await?;
        rx.await.map_err(|_| PositionError::ChannelClosed)?
    }

    /// Remove a position. Returns `false` if it was not subscribed.
    pub async fn unsubscribe(&self, symbol: &str) -> PositionResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(AggregatorMsg::Unsubscribe {
            symbol: symbol.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PositionError::ChannelClosed)
    }

    /// Deliver a resolved quote.
    pub async fn on_tick(&self, quote: Quote) -> PositionResult<()> {
        self.send(AggregatorMsg::Tick(quote)).await
    }

    /// Ask the owner to recompute stale and failing symbols.
    pub async fn refresh_stale(&self) -> PositionResult<()> {
        self.send(AggregatorMsg::RefreshStale).await
    }

    /// Update the VIX level used for vega risk classification.
    pub async fn set_vix(&self, vix: f64) -> PositionResult<()> {
        self.send(AggregatorMsg::SetVix(vix)).await
    }

    /// Request graceful shutdown. In-flight jobs complete first.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(AggregatorMsg::Shutdown).await;
    }

    async fn send(&self, msg: AggregatorMsg) -> PositionResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| PositionError::ChannelClosed)
    }

    // === Sync methods (published state) ===

    /// Latest Greeks for a symbol.
    #[must_use]
    pub fn live_greeks(&self, symbol: &str) -> Option<GreeksSnapshot> {
        self.shared.live.get(symbol).map(|entry| entry.clone())
    }

    /// Latest Greeks for every priced symbol.
    #[must_use]
    pub fn all_live_greeks(&self) -> Vec<GreeksSnapshot> {
        self.shared
            .live
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Latest portfolio aggregate.
    #[must_use]
    pub fn portfolio(&self) -> Arc<PortfolioSnapshot> {
        Arc::clone(&self.shared.portfolio.read())
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.shared.positions.get(symbol).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.shared
            .positions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.shared
            .positions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    #[must_use]
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.shared.positions.contains_key(symbol)
    }

    /// Symbol history, or portfolio history when `symbol` is `None`.
    #[must_use]
    pub fn history(&self, symbol: Option<&str>, limit: usize) -> HistoryView {
        self.shared.history.read().view(symbol, limit)
    }

    #[must_use]
    pub fn status(&self) -> AggregatorStatus {
        self.shared.status.read().clone()
    }

    /// Receive owner events from now on.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Spawn function
// ============================================================================

/// Spawn the aggregator actor.
///
/// Returns a handle for interaction and a join handle for the task.
pub fn spawn_aggregator(
    config: AggregatorConfig,
    calculator: Arc<dyn GreeksCalculator>,
) -> PositionResult<(AggregatorHandle, JoinHandle<()>)> {
    config.validate()?;

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let now = Utc::now();
    let shared = Arc::new(Shared {
        live: DashMap::new(),
        positions: DashMap::new(),
        portfolio: RwLock::new(Arc::new(PortfolioSnapshot::empty(now))),
        history: RwLock::new(GreeksHistory::new(config.history_limit)),
        status: RwLock::new(AggregatorStatus::default()),
    });

    let task = AggregatorTask {
        rx,
        results_tx,
        results_rx,
        book: PositionBook::new(config),
        calculator,
        in_flight: HashSet::new(),
        pending: HashSet::new(),
        shared: Arc::clone(&shared),
        events: events.clone(),
        counters: TickCounters::default(),
        draining: false,
    };

    let handle = AggregatorHandle { tx, shared, events };
    let join_handle = tokio::spawn(task.run());

    Ok((handle, join_handle))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use thetawatch_core::{Leg, OptionType};
    use thetawatch_greeks::{
        BlackScholesCalculator, CalculationResult, LegGreeks, PricingInput,
    };

    /// Counts calls and optionally sleeps or panics.
    struct CountingCalculator {
        calls: AtomicUsize,
        delay: StdDuration,
        panic_on_negative_spot: bool,
    }

    impl CountingCalculator {
        fn new(delay: StdDuration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                panic_on_negative_spot: false,
            }
        }
    }

    impl GreeksCalculator for CountingCalculator {
        fn calculate(&self, input: &PricingInput) -> CalculationResult<LegGreeks> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_negative_spot && input.spot < 0.0 {
                panic!("negative spot");
            }
            std::thread::sleep(self.delay);
            BlackScholesCalculator::default().calculate(input)
        }
    }

    fn call_position(symbol: &str) -> Position {
        Position::new(
            symbol,
            None,
            vec![Leg::new(
                OptionType::Call,
                100.0,
                Utc::now() + Duration::days(30),
                1,
            )],
        )
    }

    fn quote(symbol: &str, spot: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            spot,
            timestamp: Utc::now(),
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        condition()
    }

    fn spawn_default() -> (AggregatorHandle, JoinHandle<()>) {
        spawn_aggregator(
            AggregatorConfig::default(),
            Arc::new(BlackScholesCalculator::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_tick_unsubscribe() {
        let (handle, _join) = spawn_default();

        handle.subscribe(call_position("X")).await.unwrap();
        assert_eq!(handle.portfolio().position_count, 1);

        handle.on_tick(quote("X", 105.0)).await.unwrap();
        assert!(wait_until(|| handle.live_greeks("X").is_some()).await);

        let greeks = handle.live_greeks("X").unwrap();
        assert!(greeks.delta > 0.0);
        assert!(wait_until(|| (handle.portfolio().delta - greeks.delta).abs() < 1e-6).await);

        assert!(handle.unsubscribe("X").await.unwrap());
        assert_eq!(handle.portfolio().position_count, 0);
        assert!(handle.live_greeks("X").is_none());
        assert!(!handle.unsubscribe("X").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_rejects_empty_position() {
        let (handle, _join) = spawn_default();
        let result = handle.subscribe(Position::new("X", None, vec![])).await;
        assert!(matches!(result, Err(PositionError::InvalidPosition(_))));
        assert!(!handle.is_subscribed("X"));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (handle, _join) = spawn_default();
        let mut events = handle.subscribe_events();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 101.0)).await.unwrap();

        let mut saw_subscribed = false;
        let mut saw_greeks = false;
        while !(saw_subscribed && saw_greeks) {
            let event = tokio::time::timeout(StdDuration::from_secs(2), events.recv())
                .await
                .expect("event timeout")
                .unwrap();
            match event {
                AggregatorEvent::PositionSubscribed(symbol) => {
                    saw_subscribed = symbol == "X";
                }
                AggregatorEvent::GreeksUpdated(snapshot) => {
                    saw_greeks = snapshot.symbol == "X";
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_ticks_coalesce_while_in_flight() {
        let calculator = Arc::new(CountingCalculator::new(StdDuration::from_millis(100)));
        let (handle, _join) =
            spawn_aggregator(AggregatorConfig::default(), calculator.clone()).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        for i in 0..5 {
            handle.on_tick(quote("X", 100.0 + f64::from(i))).await.unwrap();
        }

        assert!(wait_until(|| handle.live_greeks("X").is_some()).await);
        assert!(wait_until(|| handle.status().in_flight == 0).await);

        let status = handle.status();
        assert_eq!(status.ticks_received, 5);
        assert!(status.ticks_coalesced >= 1);
        assert!(calculator.calls.load(Ordering::SeqCst) < 5);
    }

    #[tokio::test]
    async fn test_replacing_legs_during_computation_reprices_new_legs() {
        let calculator = Arc::new(CountingCalculator::new(StdDuration::from_millis(200)));
        let (handle, _join) =
            spawn_aggregator(AggregatorConfig::default(), calculator.clone()).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 105.0)).await.unwrap();

        let expiry = Utc::now() + Duration::days(30);
        let strangle = Position::new(
            "X",
            None,
            vec![
                Leg::new(OptionType::Put, 95.0, expiry, -10),
                Leg::new(OptionType::Call, 115.0, expiry, -10),
            ],
        );
        handle.subscribe(strangle).await.unwrap();

        assert!(wait_until(|| handle.live_greeks("X").is_some()).await);
        assert!(wait_until(|| handle.status().in_flight == 0).await);

        let greeks = handle.live_greeks("X").unwrap();
        assert_eq!(greeks.legs_priced, 2);
        assert!(greeks.theta > 0.0, "short strangle earns theta");
        assert!(greeks.gamma < 0.0);
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 3);
        assert!(wait_until(|| (handle.portfolio().gamma - greeks.gamma).abs() < 1e-9).await);
    }

    #[tokio::test]
    async fn test_resubscribe_during_computation_discards_old_result() {
        let calculator = Arc::new(CountingCalculator::new(StdDuration::from_millis(150)));
        let (handle, _join) =
            spawn_aggregator(AggregatorConfig::default(), calculator.clone()).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 105.0)).await.unwrap();
        assert!(handle.unsubscribe("X").await.unwrap());
        handle.subscribe(call_position("X")).await.unwrap();

        assert!(wait_until(|| calculator.calls.load(Ordering::SeqCst) == 1).await);
        assert!(wait_until(|| handle.status().in_flight == 0).await);
        assert!(handle.live_greeks("X").is_none());
        assert_eq!(handle.portfolio().priced_count, 0);
    }

    #[tokio::test]
    async fn test_slow_symbol_does_not_block_others() {
        /// Sleeps for deep strikes only.
        struct SlowDeepStrikes;
        impl GreeksCalculator for SlowDeepStrikes {
            fn calculate(&self, input: &PricingInput) -> CalculationResult<LegGreeks> {
                if input.strike > 1000.0 {
                    std::thread::sleep(StdDuration::from_millis(500));
                }
                BlackScholesCalculator::default().calculate(input)
            }
        }

        let (handle, _join) =
            spawn_aggregator(AggregatorConfig::default(), Arc::new(SlowDeepStrikes)).unwrap();

        let slow = Position::new(
            "SLOW",
            None,
            vec![Leg::new(OptionType::Put, 5000.0, Utc::now() + Duration::days(30), -1)],
        );
        handle.subscribe(slow).await.unwrap();
        handle.subscribe(call_position("FAST")).await.unwrap();

        handle.on_tick(quote("SLOW", 5000.0)).await.unwrap();
        handle.on_tick(quote("FAST", 100.0)).await.unwrap();

        assert!(wait_until(|| handle.live_greeks("FAST").is_some()).await);
        assert!(handle.live_greeks("SLOW").is_none());
        assert!(wait_until(|| handle.live_greeks("SLOW").is_some()).await);
    }

    #[tokio::test]
    async fn test_calculator_panic_is_contained() {
        let mut calculator = CountingCalculator::new(StdDuration::ZERO);
        calculator.panic_on_negative_spot = true;
        let (handle, _join) =
            spawn_aggregator(AggregatorConfig::default(), Arc::new(calculator)).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.subscribe(call_position("Y")).await.unwrap();
        handle.on_tick(quote("X", -5.0)).await.unwrap();
        handle.on_tick(quote("Y", 100.0)).await.unwrap();

        assert!(wait_until(|| handle.live_greeks("Y").is_some()).await);
        assert!(
            wait_until(|| handle.status().failing_symbols == vec!["X".to_string()]).await
        );
        assert_eq!(handle.portfolio().position_count, 2);
    }

    #[tokio::test]
    async fn test_shutdown_completes_in_flight_work() {
        let calculator = Arc::new(CountingCalculator::new(StdDuration::from_millis(100)));
        let (handle, join) = spawn_aggregator(AggregatorConfig::default(), calculator).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 104.0)).await.unwrap();
        handle.shutdown().await;

        tokio::time::timeout(StdDuration::from_secs(5), join)
            .await
            .expect("aggregator did not stop")
            .unwrap();
        assert!(handle.live_greeks("X").is_some());
        assert!(matches!(
            handle.on_tick(quote("X", 105.0)).await,
            Err(PositionError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_prices_coalesced_quote() {
        let calculator = Arc::new(CountingCalculator::new(StdDuration::from_millis(100)));
        let config = AggregatorConfig {
            cache_ttl_ms: 1,
            ..AggregatorConfig::default()
        };
        let (handle, join) = spawn_aggregator(config, calculator.clone()).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 104.0)).await.unwrap();
        handle.on_tick(quote("X", 106.0)).await.unwrap();
        handle.shutdown().await;

        tokio::time::timeout(StdDuration::from_secs(5), join)
            .await
            .expect("aggregator did not stop")
            .unwrap();
        let greeks = handle.live_greeks("X").unwrap();
        assert!((greeks.spot_price - 106.0).abs() < f64::EPSILON);
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_history_and_vix() {
        let (handle, _join) = spawn_default();
        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 100.0)).await.unwrap();
        assert!(wait_until(|| handle.live_greeks("X").is_some()).await);

        handle.set_vix(35.0).await.unwrap();
        assert!(wait_until(|| handle.status().vix == Some(35.0)).await);

        assert_eq!(handle.history(Some("X"), 10).len(), 1);
        assert!(handle.history(None, 10).len() >= 2);
    }

    #[tokio::test]
    async fn test_refresh_stale_recomputes_from_last_quote() {
        let config = AggregatorConfig {
            cache_ttl_ms: 10,
            staleness_multiplier: 2,
            ..Default::default()
        };
        let calculator = Arc::new(CountingCalculator::new(StdDuration::ZERO));
        let (handle, _join) = spawn_aggregator(config, calculator.clone()).unwrap();

        handle.subscribe(call_position("X")).await.unwrap();
        handle.on_tick(quote("X", 100.0)).await.unwrap();
        assert!(wait_until(|| handle.live_greeks("X").is_some()).await);
        let first = handle.live_greeks("X").unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.refresh_stale().await.unwrap();

        assert!(wait_until(|| handle
            .live_greeks("X")
            .map(|s| s.computed_at > first.computed_at)
            .unwrap_or(false))
        .await);
        assert!(wait_until(|| handle.status().stale_symbols == vec!["X".to_string()]).await);
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 2);
    }
}
