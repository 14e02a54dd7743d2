use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use common::{
    BrokerAdapter, CloseReason, Config, Error, ExitPolicy, MarketDataSource, OpenPosition,
    Result, TradeEvent, TradePlan,
};
use risk::{ClosedPosition, ExitDecision, PositionManager, TradePlanner};
use strategy::{RegisteredStrategy, StrategyRegistry};

/// Timing knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    /// Upper bound on any single market-data or broker call.
    pub collaborator_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            collaborator_timeout: cfg.collaborator_timeout,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            collaborator_timeout: Duration::from_secs(5),
        }
    }
}

/// Re-entry waiting out its policy's settle delay.
#[derive(Debug)]
struct PendingReentry {
    previous: TradePlan,
    owner: Option<String>,
    due: Instant,
}

/// Polls every configured instrument, turns signals into orders and manages
/// the resulting positions.
///
/// This is the only component that calls `BrokerAdapter::submit_order`, and
/// it owns the [`PositionManager`] outright: instruments are processed one
/// after another, so FLAT/OPEN transitions never race.
pub struct ExecutionLoop {
    registry: StrategyRegistry,
    positions: PositionManager,
    market: Arc<dyn MarketDataSource>,
    broker: Arc<dyn BrokerAdapter>,
    settings: LoopSettings,
    event_tx: mpsc::Sender<TradeEvent>,
    /// Strategy that opened each instrument's current position.
    owners: HashMap<String, String>,
    /// Flat instruments holding for a re-entry; fresh signals are ignored meanwhile.
    reentries: HashMap<String, PendingReentry>,
}

impl ExecutionLoop {
    pub fn new(
        registry: StrategyRegistry,
        market: Arc<dyn MarketDataSource>,
        broker: Arc<dyn BrokerAdapter>,
        settings: LoopSettings,
    ) -> (Self, mpsc::Receiver<TradeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let exec = Self {
            registry,
            positions: PositionManager::new(ExitPolicy::default()),
            market,
            broker,
            settings,
            event_tx,
            owners: HashMap::new(),
            reentries: HashMap::new(),
        };
        (exec, event_rx)
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            instruments = ?self.registry.instruments(),
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            "ExecutionLoop running"
        );
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(
            open = ?self.positions.open_instruments(),
            dropped_reentries = ?self.reentries.keys().collect::<Vec<_>>(),
            "ExecutionLoop stopped"
        );
    }

    /// One pass over every instrument. Failures are logged per instrument and
    /// never stop the pass.
    pub async fn poll_once(&mut self) {
        if let Err(e) = self.reconcile().await {
            self.report("*", e).await;
        }
        for instrument in self.registry.instruments() {
            if let Err(e) = self.step(&instrument).await {
                self.report(&instrument, e).await;
            }
        }
    }

    async fn report(&self, instrument: &str, e: Error) {
        if e.is_skippable() {
            debug!(pair = %instrument, reason = %e, "Skipping instrument this cycle");
            return;
        }
        match e {
            Error::CollaboratorUnavailable { .. } => {
                error!(pair = %instrument, error = %e, "Collaborator call failed");
                self.emit(TradeEvent::CollaboratorFailed {
                    instrument: instrument.to_string(),
                    error: e.to_string(),
                })
                .await;
            }
            _ => warn!(pair = %instrument, error = %e, "Instrument cycle failed"),
        }
    }

    async fn emit(&self, event: TradeEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Bounds a collaborator call by `collaborator_timeout`.
    async fn call<T>(
        &self,
        collaborator: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.settings.collaborator_timeout;
        match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(
                collaborator,
                format!("no answer within {} ms", limit.as_millis()),
            )),
        }
    }

    /// Mirrors broker-side closes (bracket hits, manual closes) into local state.
    async fn reconcile(&mut self) -> Result<()> {
        let broker = Arc::clone(&self.broker);
        let remote = self.call("broker", broker.open_positions()).await?;
        for closed in self.positions.sync(&remote) {
            self.owners.remove(&closed.position.instrument);
            self.emit(TradeEvent::PositionClosed {
                instrument: closed.position.instrument.clone(),
                reason: closed.reason,
                profit: None,
                at: Utc::now(),
            })
            .await;
        }
        Ok(())
    }

    async fn step(&mut self, instrument: &str) -> Result<()> {
        if self.positions.is_open(instrument) {
            return self.manage_exit(instrument).await;
        }
        match self.reentries.get(instrument).map(|pending| pending.due) {
            Some(due) if Instant::now() < due => Ok(()),
            Some(_) => self.reenter(instrument).await,
            None => self.try_enter(instrument).await,
        }
    }

    // ─── Entries ──────────────────────────────────────────────────────────────

    async fn try_enter(&mut self, instrument: &str) -> Result<()> {
        let market = Arc::clone(&self.market);
        let broker = Arc::clone(&self.broker);

        let mut fired = None;
        for strategy in self.registry.for_instrument(instrument) {
            let cfg = &strategy.config;
            let series = self
                .call("market data", market.candles(instrument, cfg.timeframe, cfg.candles))
                .await?;
            let signal = match strategy.detect(&series) {
                Ok(signal) => signal,
                Err(e) if e.is_skippable() => {
                    debug!(pair = %instrument, strategy = %strategy.name(), reason = %e, "Detector skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if signal.meta.awaiting_pullback {
                debug!(pair = %instrument, strategy = %strategy.name(), "Structure break awaiting pullback");
            }
            if let Some(side) = signal.direction.side() {
                fired = Some((strategy.clone(), series, signal, side));
                break;
            }
        }
        let Some((strategy, series, signal, side)) = fired else {
            return Ok(());
        };
        info!(
            pair = %instrument,
            strategy = %strategy.name(),
            direction = %signal.direction,
            anchor = signal.anchor_index,
            "Signal fired"
        );

        let planner = TradePlanner::new(strategy.config.profile);
        let levels = planner.levels(&series, &signal, side)?;
        let meta = self.call("broker", broker.instrument_meta(instrument)).await?;
        let tick = self.call("market data", market.tick(instrument)).await?;
        let plan = planner.plan(
            &self.positions,
            instrument,
            side,
            &levels,
            &meta,
            tick,
            strategy.config.quantity,
        )?;

        if self.call("broker", broker.has_open_position(instrument)).await? {
            debug!(pair = %instrument, "Broker already reports a position; waiting for reconcile");
            return Ok(());
        }

        match self.call("broker", broker.submit_order(&plan)).await {
            Ok(ticket_id) => {
                self.record_open(&strategy, plan.clone(), ticket_id.clone())?;
                self.emit(TradeEvent::OrderPlaced {
                    strategy: strategy.name().to_string(),
                    plan,
                    ticket_id,
                    at: Utc::now(),
                })
                .await;
                Ok(())
            }
            Err(Error::OrderRejected { reason }) => {
                warn!(pair = %instrument, strategy = %strategy.name(), %reason, "Order rejected");
                self.emit(TradeEvent::OrderRejected {
                    strategy: strategy.name().to_string(),
                    instrument: instrument.to_string(),
                    reason,
                })
                .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn record_open(&mut self, strategy: &RegisteredStrategy, plan: TradePlan, ticket_id: String) -> Result<()> {
        let instrument = plan.instrument.clone();
        self.positions
            .set_policy(&instrument, strategy.config.exit_policy(&instrument).clone());
        info!(
            pair = %instrument,
            strategy = %strategy.name(),
            side = %plan.side,
            entry = plan.entry_price,
            sl = plan.stop_loss,
            tp = plan.take_profit,
            volume = plan.volume,
            ticket = %ticket_id,
            "Order placed"
        );
        self.positions
            .open(OpenPosition::from_plan(&plan, ticket_id), plan)?;
        self.reentries.remove(&instrument);
        self.owners.insert(instrument, strategy.name().to_string());
        Ok(())
    }

    // ─── Exits ────────────────────────────────────────────────────────────────

    async fn manage_exit(&mut self, instrument: &str) -> Result<()> {
        let market = Arc::clone(&self.market);
        let broker = Arc::clone(&self.broker);

        let Some(position) = self.positions.position(instrument).cloned() else {
            return Ok(());
        };
        let tick = self.call("market data", market.tick(instrument)).await?;
        let mark = tick.exit_price(position.side);

        let ExitDecision::Close { reason, profit } = self.positions.evaluate(instrument, mark)? else {
            return Ok(());
        };
        self.call("broker", broker.close_position(&position.ticket_id, mark))
            .await?;
        let closed = self.positions.close(instrument, reason)?;
        let owner = self.owners.remove(instrument);
        self.emit(TradeEvent::PositionClosed {
            instrument: instrument.to_string(),
            reason,
            profit: Some(profit),
            at: Utc::now(),
        })
        .await;

        if closed.reopen {
            self.schedule_reentry(closed, owner);
        }
        Ok(())
    }

    /// Parks the closed plan until the policy's settle delay has passed; a
    /// later pass resubmits it.
    fn schedule_reentry(&mut self, closed: ClosedPosition, owner: Option<String>) {
        let Some(previous) = closed.plan else {
            return;
        };
        let instrument = previous.instrument.clone();
        let delay = self.positions.policy(&instrument).reopen_delay;
        debug!(pair = %instrument, delay_ms = delay.as_millis() as u64, "Re-entry scheduled");
        self.reentries.insert(
            instrument,
            PendingReentry {
                previous,
                owner,
                due: Instant::now() + delay,
            },
        );
    }

    /// Resubmits the parked plan at the same SL/TP distances. One attempt:
    /// on failure the instrument goes back to normal signal evaluation.
    async fn reenter(&mut self, instrument: &str) -> Result<()> {
        let Some(PendingReentry { previous, owner, .. }) = self.reentries.remove(instrument) else {
            return Ok(());
        };
        let market = Arc::clone(&self.market);
        let broker = Arc::clone(&self.broker);

        let strategy = owner
            .and_then(|name| {
                self.registry
                    .strategies()
                    .iter()
                    .find(|s| s.name() == name)
                    .cloned()
            })
            .ok_or_else(|| Error::Config(format!("no strategy owns the position on {instrument}")))?;

        let meta = self.call("broker", broker.instrument_meta(instrument)).await?;
        let tick = self.call("market data", market.tick(instrument)).await?;
        let plan = TradePlanner::new(strategy.config.profile).replan(&self.positions, &previous, &meta, tick)?;

        if self.call("broker", broker.has_open_position(instrument)).await? {
            debug!(pair = %instrument, "Broker already reports a position; re-entry dropped");
            return Ok(());
        }
        let ticket_id = self.call("broker", broker.submit_order(&plan)).await?;
        self.record_open(&strategy, plan.clone(), ticket_id.clone())?;
        self.emit(TradeEvent::PositionReopened { plan, ticket_id }).await;
        Ok(())
    }
}

/// Logs trade events until the loop drops its sender.
pub async fn log_events(mut event_rx: mpsc::Receiver<TradeEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            TradeEvent::OrderPlaced { strategy, plan, ticket_id, .. } => {
                info!(%strategy, pair = %plan.instrument, side = %plan.side, ticket = %ticket_id, "Event: order placed");
            }
            TradeEvent::OrderRejected { strategy, instrument, reason } => {
                warn!(%strategy, pair = %instrument, %reason, "Event: order rejected");
            }
            TradeEvent::PositionClosed { instrument, reason, profit, .. } => {
                info!(pair = %instrument, reason = %reason, profit = ?profit, "Event: position closed");
            }
            TradeEvent::PositionReopened { plan, ticket_id } => {
                info!(pair = %plan.instrument, side = %plan.side, ticket = %ticket_id, "Event: position reopened");
            }
            TradeEvent::CollaboratorFailed { instrument, error } => {
                error!(pair = %instrument, %error, "Event: collaborator failed");
            }
        }
    }
    warn!("Trade event channel closed");
}

// ─── Tests ────────────────────────────────────────────────────────────────────
