pub mod replay;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use common::{
    BrokerAdapter, Candle, Error, InstrumentMeta, MarketDataSource, OpenPosition, OrderSide,
    PriceSeries, Result, Tick, TicketId, Timeframe, TradePlan,
};

pub use replay::{InstrumentFeed, ReplayFeed};

/// How a paper position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperExit {
    StopLoss,
    TakeProfit,
    /// `close_position` called by the client.
    Manual,
}

/// A position the paper broker has closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub position: OpenPosition,
    pub exit_price: f64,
    pub profit: f64,
    pub exit: PaperExit,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Book {
    meta: InstrumentMeta,
    spread: f64,
    candles: Vec<Candle>,
    tick: Option<Tick>,
}

#[derive(Debug, Clone)]
struct Ticket {
    position: OpenPosition,
    stop_loss: f64,
    take_profit: f64,
}

impl Ticket {
    /// Bracket level hit at `tick`, if any.
    fn triggered(&self, tick: Tick) -> Option<(PaperExit, f64)> {
        let mark = tick.exit_price(self.position.side);
        let (stop_hit, target_hit) = match self.position.side {
            OrderSide::Buy => (mark <= self.stop_loss, mark >= self.take_profit),
            OrderSide::Sell => (mark >= self.stop_loss, mark <= self.take_profit),
        };
        if stop_hit {
            Some((PaperExit::StopLoss, mark))
        } else if target_hit {
            Some((PaperExit::TakeProfit, mark))
        } else {
            None
        }
    }
}

fn realised(position: &OpenPosition, exit_price: f64) -> f64 {
    match position.side {
        OrderSide::Buy => (exit_price - position.entry_price) * position.volume,
        OrderSide::Sell => (position.entry_price - exit_price) * position.volume,
    }
}

/// Simulated broker and market data source.
///
/// Fills happen at the current quote with configurable slippage. Every
/// accepted order carries its bracket; a quote crossing the stop-loss or
/// take-profit closes the position broker-side, which the execution loop then
/// picks up through `open_positions`.
pub struct PaperBroker {
    books: RwLock<HashMap<String, Book>>,
    tickets: RwLock<Vec<Ticket>>,
    closed: RwLock<Vec<ClosedTrade>>,
    /// Slippage in basis points applied against the client on every fill.
    slippage_bps: f64,
    submitted: AtomicUsize,
}

impl PaperBroker {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperBroker initialized");
        Self {
            books: RwLock::new(HashMap::new()),
            tickets: RwLock::new(Vec::new()),
            closed: RwLock::new(Vec::new()),
            slippage_bps,
            submitted: AtomicUsize::new(0),
        }
    }

    /// Registers an instrument. `spread` is added to the close to form the ask.
    pub async fn add_instrument(&self, instrument: &str, meta: InstrumentMeta, spread: f64) {
        self.books.write().await.insert(
            instrument.to_string(),
            Book {
                meta,
                spread,
                candles: Vec::new(),
                tick: None,
            },
        );
    }

    /// Appends a completed bar and moves the quote to its close.
    ///
    /// Returns the positions the new quote closed broker-side.
    pub async fn push_candle(&self, instrument: &str, candle: Candle) -> Result<Vec<ClosedTrade>> {
        let tick = {
            let mut books = self.books.write().await;
            let book = books
                .get_mut(instrument)
                .ok_or_else(|| Error::UnknownInstrument(instrument.to_string()))?;
            if let Some(last) = book.candles.last() {
                if candle.timestamp <= last.timestamp {
                    return Err(Error::InvalidSeries(format!(
                        "{instrument}: candle at {} does not follow {}",
                        candle.timestamp, last.timestamp
                    )));
                }
            }
            book.candles.push(candle);
            let tick = Tick {
                bid: candle.close,
                ask: candle.close + book.spread,
            };
            book.tick = Some(tick);
            tick
        };
        Ok(self.trigger_brackets(instrument, tick).await)
    }

    /// Overrides the current quote without adding a bar.
    pub async fn set_tick(&self, instrument: &str, tick: Tick) -> Result<Vec<ClosedTrade>> {
        {
            let mut books = self.books.write().await;
            let book = books
                .get_mut(instrument)
                .ok_or_else(|| Error::UnknownInstrument(instrument.to_string()))?;
            book.tick = Some(tick);
        }
        Ok(self.trigger_brackets(instrument, tick).await)
    }

    /// Number of `submit_order` calls received, accepted or not.
    pub fn submitted_orders(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Every position closed so far, oldest first.
    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.closed.read().await.clone()
    }

    async fn trigger_brackets(&self, instrument: &str, tick: Tick) -> Vec<ClosedTrade> {
        let mut tickets = self.tickets.write().await;
        let mut hits = Vec::new();
        tickets.retain(|t| {
            if t.position.instrument != instrument {
                return true;
            }
            match t.triggered(tick) {
                Some((exit, price)) => {
                    hits.push((t.position.clone(), exit, price));
                    false
                }
                None => true,
            }
        });
        drop(tickets);

        let mut closed = Vec::with_capacity(hits.len());
        for (position, exit, exit_price) in hits {
            let profit = realised(&position, exit_price);
            info!(
                pair = %instrument,
                ticket = %position.ticket_id,
                exit = ?exit,
                price = exit_price,
                profit,
                "Paper bracket triggered"
            );
            closed.push(ClosedTrade {
                position,
                exit_price,
                profit,
                exit,
                closed_at: Utc::now(),
            });
        }
        self.closed.write().await.extend(closed.iter().cloned());
        closed
    }

    async fn book<T>(&self, instrument: &str, f: impl FnOnce(&Book) -> T) -> Result<T> {
        let books = self.books.read().await;
        books
            .get(instrument)
            .map(f)
            .ok_or_else(|| Error::UnknownInstrument(instrument.to_string()))
    }

    fn fill_price(&self, side: OrderSide, tick: Tick) -> f64 {
        let slip = self.slippage_bps / 10_000.0;
        match side {
            OrderSide::Buy => tick.ask * (1.0 + slip),
            OrderSide::Sell => tick.bid * (1.0 - slip),
        }
    }
}

#[async_trait]
impl MarketDataSource for PaperBroker {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<PriceSeries> {
        let candles = self
            .book(instrument, |b| {
                let start = b.candles.len().saturating_sub(count);
                b.candles[start..].to_vec()
            })
            .await?;
        debug!(pair = %instrument, timeframe = %timeframe, bars = candles.len(), "Paper candles served");
        PriceSeries::new(candles)
    }

    async fn tick(&self, instrument: &str) -> Result<Tick> {
        self.book(instrument, |b| b.tick)
            .await?
            .ok_or_else(|| Error::unavailable("paper market data", format!("no quote yet for {instrument}")))
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn has_open_position(&self, instrument: &str) -> Result<bool> {
        Ok(self
            .tickets
            .read()
            .await
            .iter()
            .any(|t| t.position.instrument == instrument))
    }

    async fn submit_order(&self, plan: &TradePlan) -> Result<TicketId> {
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let (meta, tick) = self.book(&plan.instrument, |b| (b.meta, b.tick)).await?;
        let tick = tick.ok_or_else(|| Error::OrderRejected {
            reason: format!("no quote for {}", plan.instrument),
        })?;
        if plan.volume < meta.min_lot_size {
            return Err(Error::OrderRejected {
                reason: format!("volume {} below minimum lot {}", plan.volume, meta.min_lot_size),
            });
        }

        let fill_price = self.fill_price(plan.side, tick);
        let filled = TradePlan {
            entry_price: fill_price,
            ..plan.clone()
        };
        if !filled.is_well_ordered() {
            return Err(Error::OrderRejected {
                reason: format!(
                    "fill {fill_price} is outside the bracket {} / {}",
                    plan.stop_loss, plan.take_profit
                ),
            });
        }

        let ticket_id = Uuid::new_v4().to_string();
        debug!(
            pair = %plan.instrument,
            side = %plan.side,
            quoted = plan.entry_price,
            fill = fill_price,
            volume = plan.volume,
            "Paper fill simulated"
        );
        self.tickets.write().await.push(Ticket {
            position: OpenPosition::from_plan(&filled, ticket_id.clone()),
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
        });
        Ok(ticket_id)
    }

    async fn close_position(&self, ticket_id: &str, at_price: f64) -> Result<()> {
        let ticket = {
            let mut tickets = self.tickets.write().await;
            let idx = tickets
                .iter()
                .position(|t| t.position.ticket_id == ticket_id)
                .ok_or_else(|| Error::OrderRejected {
                    reason: format!("unknown ticket {ticket_id}"),
                })?;
            tickets.remove(idx)
        };
        let profit = realised(&ticket.position, at_price);
        info!(
            pair = %ticket.position.instrument,
            ticket = %ticket_id,
            price = at_price,
            profit,
            "Paper position closed"
        );
        self.closed.write().await.push(ClosedTrade {
            position: ticket.position,
            exit_price: at_price,
            profit,
            exit: PaperExit::Manual,
            closed_at: Utc::now(),
        });
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>> {
        Ok(self
            .tickets
            .read()
            .await
            .iter()
            .map(|t| t.position.clone())
            .collect())
    }

    async fn instrument_meta(&self, instrument: &str) -> Result<InstrumentMeta> {
        self.book(instrument, |b| b.meta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> InstrumentMeta {
        InstrumentMeta {
            min_stop_distance: 0.1,
            price_step: 0.01,
            lot_step: 0.01,
            min_lot_size: 0.01,
        }
    }

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 300, 0).unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1.0,
        }
    }

    fn plan(side: OrderSide, entry: f64, sl: f64, tp: f64) -> TradePlan {
        TradePlan {
            instrument: "EURUSD".into(),
            side,
            entry_price: entry,
            stop_loss: sl,
            take_profit: tp,
            volume: 1.0,
        }
    }

    async fn broker(slippage_bps: f64) -> PaperBroker {
        let broker = PaperBroker::new(slippage_bps);
        broker.add_instrument("EURUSD", meta(), 0.2).await;
        broker.push_candle("EURUSD", candle(0, 100.0)).await.unwrap();
        broker
    }

    #[tokio::test]
    async fn quote_follows_last_close_plus_spread() {
        let broker = broker(0.0).await;
        let tick = broker.tick("EURUSD").await.unwrap();
        assert_eq!(tick, Tick { bid: 100.0, ask: 100.2 });
        assert!(matches!(
            broker.tick("GBPUSD").await,
            Err(Error::UnknownInstrument(_))
        ));
    }

    #[tokio::test]
    async fn candles_returns_most_recent_bars() {
        let broker = broker(0.0).await;
        for i in 1..10 {
            broker.push_candle("EURUSD", candle(i, 100.0 + i as f64)).await.unwrap();
        }
        let series = broker.candles("EURUSD", Timeframe::M5, 3).await.unwrap();
        assert_eq!(series.closes(), vec![107.0, 108.0, 109.0]);
        let all = broker.candles("EURUSD", Timeframe::M5, 500).await.unwrap();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn stale_candle_is_rejected() {
        let broker = broker(0.0).await;
        let err = broker.push_candle("EURUSD", candle(0, 101.0)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSeries(_)));
    }

    #[tokio::test]
    async fn buy_fill_applies_slippage() {
        let broker = broker(10.0).await;
        let ticket = broker
            .submit_order(&plan(OrderSide::Buy, 100.2, 99.0, 102.0))
            .await
            .unwrap();
        let positions = broker.open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket_id, ticket);
        let expected = 100.2 * (1.0 + 10.0 / 10_000.0);
        assert!((positions[0].entry_price - expected).abs() < 1e-9);
        assert!(broker.has_open_position("EURUSD").await.unwrap());
        assert_eq!(broker.submitted_orders(), 1);
    }

    #[tokio::test]
    async fn order_outside_bracket_is_rejected() {
        let broker = broker(0.0).await;
        let err = broker
            .submit_order(&plan(OrderSide::Buy, 100.2, 100.5, 102.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OrderRejected { .. }));
        assert!(!broker.has_open_position("EURUSD").await.unwrap());
        assert_eq!(broker.submitted_orders(), 1);
    }

    #[tokio::test]
    async fn stop_loss_triggers_broker_side() {
        let broker = broker(0.0).await;
        broker
            .submit_order(&plan(OrderSide::Buy, 100.2, 99.0, 102.0))
            .await
            .unwrap();
        assert!(broker.push_candle("EURUSD", candle(1, 99.5)).await.unwrap().is_empty());

        let closed = broker.push_candle("EURUSD", candle(2, 98.9)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit, PaperExit::StopLoss);
        assert!((closed[0].profit - (98.9 - 100.2)).abs() < 1e-9);
        assert!(broker.open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sell_take_profit_uses_ask() {
        let broker = broker(0.0).await;
        broker
            .submit_order(&plan(OrderSide::Sell, 100.0, 101.0, 98.0))
            .await
            .unwrap();
        // ask = 98.0 + 0.2, not yet at target
        assert!(broker.push_candle("EURUSD", candle(1, 98.0)).await.unwrap().is_empty());
        let closed = broker
            .set_tick("EURUSD", Tick { bid: 97.7, ask: 97.9 })
            .await
            .unwrap();
        assert_eq!(closed[0].exit, PaperExit::TakeProfit);
        assert!((closed[0].profit - 2.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn manual_close_records_trade() {
        let broker = broker(0.0).await;
        let ticket = broker
            .submit_order(&plan(OrderSide::Buy, 100.2, 99.0, 102.0))
            .await
            .unwrap();
        broker.close_position(&ticket, 101.0).await.unwrap();
        assert!(matches!(
            broker.close_position(&ticket, 101.0).await,
            Err(Error::OrderRejected { .. })
        ));
        let trades = broker.closed_trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit, PaperExit::Manual);
        assert!((trades[0].profit - 0.8).abs() < 1e-9);
    }
}
