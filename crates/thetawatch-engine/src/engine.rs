//! Risk engine orchestration.
//!
//! Wires the market feed into the aggregator, runs the periodic threshold
//! evaluation and telemetry tasks, and exposes the pull API and observer
//! registration used by callers.
//!
//! # Task layout
//!
//! - feed loop: feed events -> `Tick::resolve` -> aggregator (suspended
//!   while the feed is disconnected, re-subscribes on reconnect, forwards
//!   already-queued events on stop)
//! - evaluation loop: threshold evaluation every `evaluation_interval`
//! - telemetry loop: stale refresh and gauge refresh every `telemetry_interval`
//! - event forwarder: aggregator events -> engine observers
//!
//! Periodic tasks only read published snapshots; they never block the
//! aggregator's tick path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use thetawatch_core::{GreeksSnapshot, ObserverId, ObserverRegistry, ObserverResult, PortfolioSnapshot, Position};
use thetawatch_feed::{DynMarketFeed, FeedEvent};
use thetawatch_greeks::GreeksCalculator;
use thetawatch_position::{
    spawn_aggregator, AggregatorEvent, AggregatorHandle, ExitEvaluator, ExitPlan, HealthScore,
    HealthScorer, HistoryView, PositionMetrics,
};
use thetawatch_risk::{
    AddDecision, Alert, AlertType, ConcentrationReport, CorrelationTracker, EmergencyStop,
    ThresholdMonitor,
};
use thetawatch_telemetry::Metrics;
use thetawatch_theta::{OptimizationSummary, ThetaInput, ThetaOptimizer};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};

// ============================================================================
// Events and status
// ============================================================================

/// Events delivered to engine observers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    GreeksUpdated(GreeksSnapshot),
    AlertRaised(Alert),
    PositionSubscribed(String),
    PositionUnsubscribed(String),
    StreamingStarted,
    StreamingStopped,
}

/// Point-in-time engine status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub streaming: bool,
    pub feed_connected: bool,
    pub subscribed: usize,
    pub stale_symbols: Vec<String>,
    pub failing_symbols: Vec<String>,
    pub ticks_received: u64,
    pub ticks_ignored: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub computations: u64,
    pub alert_count: usize,
    pub emergency_stop_active: bool,
    pub emergency_stop_reason: Option<String>,
    pub last_evaluation: Option<DateTime<Utc>>,
    pub vix: Option<f64>,
}

#[derive(Debug, Default)]
struct EngineState {
    started: AtomicBool,
    stopped: AtomicBool,
    feed_connected: AtomicBool,
}

type EngineObservers = Arc<ObserverRegistry<EngineEvent>>;

fn notify(observers: &ObserverRegistry<EngineEvent>, event: EngineEvent) {
    let report = observers.notify(&event);
    if report.failed > 0 {
        Metrics::observer_failures("engine", report.failed);
    }
}

// ============================================================================
// RiskEngine
// ============================================================================

/// Real-time portfolio risk engine.
pub struct RiskEngine {
    config: AppConfig,
    aggregator: AggregatorHandle,
    aggregator_join: Mutex<Option<JoinHandle<()>>>,
    feed: DynMarketFeed,
    monitor: Arc<ThresholdMonitor>,
    correlation: CorrelationTracker,
    health: HealthScorer,
    exits: ExitEvaluator,
    optimizer: ThetaOptimizer,
    stop: Arc<EmergencyStop>,
    observers: EngineObservers,
    state: Arc<EngineState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RiskEngine {
    /// Build the engine and spawn its aggregator.
    ///
    /// Must be called within a Tokio runtime. Every component config is
    /// validated here.
    pub fn new(
        config: AppConfig,
        calculator: Arc<dyn GreeksCalculator>,
        feed: DynMarketFeed,
    ) -> EngineResult<Self> {
        config.validate()?;

        let stop = Arc::new(EmergencyStop::new());
        let monitor = Arc::new(ThresholdMonitor::new(
            config.thresholds.clone(),
            Arc::clone(&stop),
        )?);
        let correlation = CorrelationTracker::new(config.correlation.clone(), Arc::clone(&stop))?;
        let optimizer = ThetaOptimizer::new(config.theta.clone())?;
        let (aggregator, aggregator_join) =
            spawn_aggregator(config.aggregator.clone(), calculator)?;

        let observers: EngineObservers = Arc::new(ObserverRegistry::new("engine"));
        {
            let observers = Arc::clone(&observers);
            monitor.register_callback(move |alert| {
                notify(&observers, EngineEvent::AlertRaised(alert.clone()));
                Ok(())
            });
        }

        let cancel = CancellationToken::new();
        let forwarder = tokio::spawn(forward_aggregator_events(
            aggregator.subscribe_events(),
            Arc::clone(&observers),
            cancel.clone(),
        ));

        Ok(Self {
            health: HealthScorer::new(config.health.clone()),
            exits: ExitEvaluator::new(config.exit.clone()),
            config,
            aggregator,
            aggregator_join: Mutex::new(Some(aggregator_join)),
            feed,
            monitor,
            correlation,
            optimizer,
            stop,
            observers,
            state: Arc::new(EngineState::default()),
            cancel,
            tasks: Mutex::new(vec![forwarder]),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // === Lifecycle ===

    /// Start streaming: consume `events` and run the periodic tasks.
    pub fn start(&self, events: mpsc::Receiver<FeedEvent>) -> EngineResult<()> {
        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::Stopped);
        }
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        let connected = self.feed.is_connected();
        self.state.feed_connected.store(connected, Ordering::SeqCst);
        if connected {
            Metrics::feed_connected();
        }

        let feed_loop = FeedLoop {
            aggregator: self.aggregator.clone(),
            feed: Arc::clone(&self.feed),
            state: Arc::clone(&self.state),
        };

        let tasks = [
            tokio::spawn(feed_loop.run(events, self.cancel.clone())),
            tokio::spawn(run_evaluation_loop(
                self.aggregator.clone(),
                Arc::clone(&self.monitor),
                self.config.engine.evaluation_interval(),
                self.cancel.clone(),
            )),
            tokio::spawn(run_telemetry_loop(
                self.aggregator.clone(),
                self.config.engine.telemetry_interval(),
                self.cancel.clone(),
            )),
        ];
        self.tasks.lock().extend(tasks);

        info!(
            feed_connected = connected,
            evaluation_interval_ms = self.config.engine.evaluation_interval_ms,
            telemetry_interval_ms = self.config.engine.telemetry_interval_ms,
            "Risk engine streaming started"
        );
        notify(&self.observers, EngineEvent::StreamingStarted);
        Ok(())
    }

    /// Stop streaming.
    ///
    /// Cancels the periodic tasks, unsubscribes every symbol from the feed
    /// and lets in-flight Greeks computations land before the aggregator
    /// exits. Published state stays readable afterwards.
    pub async fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping risk engine");

        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }

        let symbols = self.aggregator.symbols();
        if !symbols.is_empty() {
            if let Err(e) = self.feed.unsubscribe(symbols).await {
                warn!(error = %e, "Feed unsubscribe failed during stop");
            }
        }

        self.aggregator.shutdown().await;
        let join = self.aggregator_join.lock().take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                warn!(error = %e, "Aggregator task ended abnormally");
            }
        }

        if self.state.started.load(Ordering::SeqCst) {
            notify(&self.observers, EngineEvent::StreamingStopped);
        }
        info!("Risk engine stopped");
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state.started.load(Ordering::SeqCst) && !self.state.stopped.load(Ordering::SeqCst)
    }

    // === Positions ===

    /// Track a position and request its quotes from the feed.
    ///
    /// A feed subscription failure is logged; the symbol is re-requested
    /// on the next reconnect.
    pub async fn subscribe_position(&self, position: Position) -> EngineResult<()> {
        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::Stopped);
        }
        let symbol = position.symbol.clone();
        self.aggregator.subscribe(position).await?;

        if let Err(e) = self.feed.subscribe(vec![symbol.clone()]).await {
            warn!(symbol = %symbol, error = %e, "Feed subscription failed, will retry on reconnect");
        }
        Ok(())
    }

    /// Stop tracking a position. Returns `false` if it was not tracked.
    pub async fn unsubscribe_position(&self, symbol: &str) -> EngineResult<bool> {
        let removed = self.aggregator.unsubscribe(symbol).await?;
        if removed {
            if let Err(e) = self.feed.unsubscribe(vec![symbol.to_string()]).await {
                warn!(symbol, error = %e, "Feed unsubscribe failed");
            }
        }
        Ok(removed)
    }

    /// Update the VIX level used for vega risk classification.
    pub async fn set_vix(&self, vix: f64) -> EngineResult<()> {
        self.aggregator.set_vix(vix).await?;
        Ok(())
    }

    // === Observers ===

    pub fn register_observer<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&EngineEvent) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.register(callback)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    // === Pull API ===

    #[must_use]
    pub fn get_live_greeks(&self, symbol: &str) -> Option<GreeksSnapshot> {
        self.aggregator.live_greeks(symbol)
    }

    #[must_use]
    pub fn get_portfolio_greeks(&self) -> Arc<PortfolioSnapshot> {
        self.aggregator.portfolio()
    }

    #[must_use]
    pub fn get_current_alerts(&self, alert_type: Option<AlertType>) -> Vec<Alert> {
        self.monitor.current_alerts(alert_type)
    }

    /// Symbol history, or portfolio history when `symbol` is `None`.
    #[must_use]
    pub fn get_greeks_history(&self, symbol: Option<&str>, limit: usize) -> HistoryView {
        self.aggregator.history(symbol, limit)
    }

    #[must_use]
    pub fn get_status(&self) -> EngineStatus {
        let status = self.aggregator.status();
        EngineStatus {
            streaming: self.is_streaming(),
            feed_connected: self.state.feed_connected.load(Ordering::SeqCst),
            subscribed: status.subscribed,
            stale_symbols: status.stale_symbols,
            failing_symbols: status.failing_symbols,
            ticks_received: status.ticks_received,
            ticks_ignored: status.ticks_ignored,
            cache_hits: status.cache_hits,
            cache_misses: status.cache_misses,
            computations: status.computations,
            alert_count: self.monitor.alert_count(),
            emergency_stop_active: self.stop.is_active(),
            emergency_stop_reason: self.stop.reason().map(|r| r.to_string()),
            last_evaluation: self.monitor.last_evaluated(),
            vix: status.vix,
        }
    }

    /// Exit plan for every tracked position.
    #[must_use]
    pub fn get_exit_plan(&self) -> ExitPlan {
        let entries = self.position_metrics(Utc::now());
        self.exits.plan(entries.iter().map(|(p, m)| (p, *m)))
    }

    /// Health score for every tracked position, sorted by symbol.
    #[must_use]
    pub fn get_health_scores(&self) -> Vec<HealthScore> {
        self.position_metrics(Utc::now())
            .iter()
            .map(|(position, metrics)| self.health.score(position, metrics))
            .collect()
    }

    /// Correlation concentration of the tracked book in `phase`.
    #[must_use]
    pub fn get_correlation_status(&self, phase: u8) -> ConcentrationReport {
        let symbols = self.aggregator.symbols();
        self.correlation
            .check_concentration(symbols.iter().map(String::as_str), phase)
    }

    /// Whether a new position in `ticker` fits the correlation limits.
    /// Uses the configured account phase when `phase` is `None`.
    #[must_use]
    pub fn can_add_position(&self, ticker: &str, phase: Option<u8>) -> AddDecision {
        let phase = phase.unwrap_or(self.config.engine.account_phase);
        let symbols = self.aggregator.symbols();
        self.correlation
            .can_add(ticker, phase, symbols.iter().map(String::as_str))
    }

    pub fn get_optimization_summary(
        &self,
        account_value: Decimal,
        vix_level: f64,
    ) -> EngineResult<OptimizationSummary> {
        let inputs = self.theta_inputs(Utc::now());
        Ok(self.optimizer.summarize(&inputs, account_value, vix_level)?)
    }

    /// Run one threshold evaluation immediately.
    pub fn evaluate_now(&self) -> Vec<Alert> {
        evaluate_thresholds(&self.aggregator, &self.monitor)
    }

    #[must_use]
    pub fn emergency_stop(&self) -> &Arc<EmergencyStop> {
        &self.stop
    }

    // === Helpers ===

    fn position_metrics(&self, now: DateTime<Utc>) -> Vec<(Position, PositionMetrics)> {
        let mut positions = self.aggregator.positions();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
            .into_iter()
            .map(|position| {
                let snapshot = self.aggregator.live_greeks(&position.symbol);
                let metrics = PositionMetrics::from_snapshot(&position, snapshot.as_ref(), now);
                (position, metrics)
            })
            .collect()
    }

    fn theta_inputs(&self, now: DateTime<Utc>) -> Vec<ThetaInput> {
        self.aggregator
            .positions()
            .into_iter()
            .map(|position| {
                let contracts = position.contracts();
                let theta_per_contract = match self.aggregator.live_greeks(&position.symbol) {
                    Some(snapshot) if contracts > 0 => snapshot.theta / contracts as f64,
                    _ => 0.0,
                };
                ThetaInput {
                    days_to_expiry: position.days_to_expiry(now),
                    premium: position.entry.entry_value.abs(),
                    symbol: position.symbol,
                    strategy: position.strategy,
                    theta_per_contract,
                    contracts,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("streaming", &self.is_streaming())
            .field("subscribed", &self.aggregator.symbols().len())
            .finish()
    }
}

// ============================================================================
// Background tasks
// ============================================================================

struct FeedLoop {
    aggregator: AggregatorHandle,
    feed: DynMarketFeed,
    state: Arc<EngineState>,
}

impl FeedLoop {
    async fn run(self, mut events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain(&mut events).await;
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Feed event channel closed");
                        break;
                    }
                },
            };

            if !self.handle(event).await {
                break;
            }
        }
        debug!("Feed loop exited");
    }

    /// Close the channel and forward whatever was queued before the stop.
    async fn drain(&self, events: &mut mpsc::Receiver<FeedEvent>) {
        events.close();
        let mut drained = 0usize;
        while let Some(event) = events.recv().await {
            drained += 1;
            if !self.handle(event).await {
                break;
            }
        }
        debug!(drained, "Drained queued feed events");
    }

    /// Returns `false` once the aggregator is gone.
    async fn handle(&self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Tick(tick) => {
                if !self.state.feed_connected.load(Ordering::SeqCst) {
                    debug!(symbol = %tick.symbol, "Feed suspended, dropping tick");
                    Metrics::tick("suspended");
                    return true;
                }
                let Some(quote) = tick.resolve() else {
                    debug!(symbol = %tick.symbol, "Dropping tick without mid/last/bid");
                    Metrics::tick("unpriced");
                    return true;
                };
                if let Err(e) = self.aggregator.on_tick(quote).await {
                    warn!(error = %e, "Aggregator unavailable, stopping feed loop");
                    return false;
                }
            }
            FeedEvent::Disconnected => {
                if self.state.feed_connected.swap(false, Ordering::SeqCst) {
                    Metrics::feed_disconnected();
                    warn!("Market feed disconnected, tick processing suspended");
                }
            }
            FeedEvent::Connected => self.on_connected().await,
        }
        true
    }

    async fn on_connected(&self) {
        self.state.feed_connected.store(true, Ordering::SeqCst);
        Metrics::feed_connected();

        let symbols = self.aggregator.symbols();
        info!(symbols = symbols.len(), "Market feed connected");
        if symbols.is_empty() {
            return;
        }
        if let Err(e) = self.feed.subscribe(symbols).await {
            warn!(error = %e, "Re-subscription after reconnect failed");
        }
    }
}

fn evaluate_thresholds(aggregator: &AggregatorHandle, monitor: &ThresholdMonitor) -> Vec<Alert> {
    let positions = aggregator.all_live_greeks();
    let portfolio = aggregator.portfolio();
    monitor.evaluate(&positions, &portfolio, Utc::now())
}

async fn run_evaluation_loop(
    aggregator: AggregatorHandle,
    monitor: Arc<ThresholdMonitor>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                evaluate_thresholds(&aggregator, &monitor);
            }
        }
    }
    debug!("Evaluation loop exited");
}

async fn run_telemetry_loop(
    aggregator: AggregatorHandle,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = aggregator.refresh_stale().await {
                    debug!(error = %e, "Stale refresh skipped");
                    break;
                }

                let status = aggregator.status();
                Metrics::stale_symbols(status.stale_symbols.len());
                Metrics::subscribed_positions(status.subscribed);

                let p = aggregator.portfolio();
                Metrics::portfolio(p.delta, p.gamma, p.theta, p.vega, p.rho, p.risk_score);
            }
        }
    }
    debug!("Telemetry loop exited");
}

async fn forward_aggregator_events(
    mut events: broadcast::Receiver<AggregatorEvent>,
    observers: EngineObservers,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(AggregatorEvent::GreeksUpdated(snapshot)) => {
                notify(&observers, EngineEvent::GreeksUpdated(snapshot));
            }
            Ok(AggregatorEvent::PositionSubscribed(symbol)) => {
                notify(&observers, EngineEvent::PositionSubscribed(symbol));
            }
            Ok(AggregatorEvent::PositionUnsubscribed(symbol)) => {
                notify(&observers, EngineEvent::PositionUnsubscribed(symbol));
            }
            Ok(AggregatorEvent::PortfolioUpdated(_)) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Engine observers lagged behind aggregator events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Event forwarder exited");
}
