use async_trait::async_trait;

use crate::{InstrumentMeta, OpenPosition, PriceSeries, Result, Tick, TicketId, Timeframe, TradePlan};

/// Source of candles and live quotes.
///
/// Failures surface as `Error::CollaboratorUnavailable`; callers decide on
/// retry and backoff.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `count` completed candles, oldest first.
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<PriceSeries>;

    /// Current best bid/ask.
    async fn tick(&self, instrument: &str) -> Result<Tick>;
}

/// Abstraction over the broker account.
///
/// The paper broker implements this for simulation. Only the execution loop
/// should call `submit_order`, and only with plans produced by the planner.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn has_open_position(&self, instrument: &str) -> Result<bool>;

    /// Submit a bracketed market order. `Err(OrderRejected)` when the broker refuses it.
    async fn submit_order(&self, plan: &TradePlan) -> Result<TicketId>;

    async fn close_position(&self, ticket_id: &str, at_price: f64) -> Result<()>;

    async fn open_positions(&self) -> Result<Vec<OpenPosition>>;

    async fn instrument_meta(&self, instrument: &str) -> Result<InstrumentMeta>;
}
