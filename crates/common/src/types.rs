use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broker-assigned identifier of an accepted order / open position.
pub type TicketId = String;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of a detector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    #[default]
    None,
}

impl Direction {
    /// Order side that acts on this direction, if any.
    pub fn side(self) -> Option<OrderSide> {
        match self {
            Direction::Long => Some(OrderSide::Buy),
            Direction::Short => Some(OrderSide::Sell),
            Direction::None => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::None => write!(f, "NONE"),
        }
    }
}

/// Swing extremes a detector anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Swing {
    pub high: f64,
    pub high_index: usize,
    pub low: f64,
    pub low_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalMeta {
    pub swing: Option<Swing>,
    /// A structure break is pending but price has not pulled back yet.
    pub awaiting_pullback: bool,
}

/// Verdict of one detector evaluation. Produced fresh each call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Bar the verdict refers to (the last bar of the evaluated series).
    pub anchor_index: usize,
    pub meta: SignalMeta,
}

impl Signal {
    pub fn none(anchor_index: usize) -> Self {
        Self {
            direction: Direction::None,
            anchor_index,
            meta: SignalMeta::default(),
        }
    }

    pub fn long(anchor_index: usize) -> Self {
        Self {
            direction: Direction::Long,
            ..Self::none(anchor_index)
        }
    }

    pub fn short(anchor_index: usize) -> Self {
        Self {
            direction: Direction::Short,
            ..Self::none(anchor_index)
        }
    }

    pub fn with_swing(mut self, swing: Swing) -> Self {
        self.meta.swing = Some(swing);
        self
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::None
    }
}

/// Best bid/ask for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    /// Price at which a new position on `side` would be filled.
    pub fn entry_price(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }

    /// Price at which an open position on `side` would be closed.
    pub fn exit_price(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.bid,
            OrderSide::Sell => self.ask,
        }
    }
}

/// Broker trading constraints for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    /// Minimum |entry - stop| (and |entry - target|) the broker accepts.
    pub min_stop_distance: f64,
    /// Tick size.
    pub price_step: f64,
    pub lot_step: f64,
    pub min_lot_size: f64,
}

/// Candle interval requested from the market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    M1,
    M3,
    #[default]
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

/// Bracketed market order ready for submission.
///
/// Accepted plans always satisfy `stop_loss < entry_price < take_profit` for
/// BUY and the reverse for SELL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub instrument: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub volume: f64,
}

impl TradePlan {
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    pub fn target_distance(&self) -> f64 {
        (self.take_profit - self.entry_price).abs()
    }

    pub fn is_well_ordered(&self) -> bool {
        match self.side {
            OrderSide::Buy => {
                self.stop_loss < self.entry_price && self.entry_price < self.take_profit
            }
            OrderSide::Sell => {
                self.take_profit < self.entry_price && self.entry_price < self.stop_loss
            }
        }
    }
}

/// Position the broker accepted and has not reported closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub volume: f64,
    pub ticket_id: TicketId,
}

impl OpenPosition {
    pub fn from_plan(plan: &TradePlan, ticket_id: TicketId) -> Self {
        Self {
            instrument: plan.instrument.clone(),
            side: plan.side,
            entry_price: plan.entry_price,
            volume: plan.volume,
            ticket_id,
        }
    }
}

/// Profit-take / stop-loss auto-close policy for the positions a strategy opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    /// Close once unrealised profit reaches this amount (quote currency).
    pub profit_threshold: f64,
    /// Close once unrealised loss reaches this amount (positive number).
    pub loss_threshold: f64,
    pub reopen_on_profit_close: bool,
    pub reopen_on_loss_close: bool,
    /// Settle delay before a re-entry is submitted.
    #[serde(with = "duration_ms", rename = "reopen_delay_ms")]
    pub reopen_delay: Duration,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            profit_threshold: 10.0,
            loss_threshold: 30.0,
            reopen_on_profit_close: false,
            reopen_on_loss_close: false,
            reopen_delay: Duration::from_secs(1),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Why a position went OPEN -> FLAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Profit,
    StopLoss,
    /// Closed broker-side (bracket hit or manual close).
    External,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Profit => write!(f, "profit"),
            CloseReason::StopLoss => write!(f, "stop-loss"),
            CloseReason::External => write!(f, "external"),
        }
    }
}

/// Events emitted by the execution loop.
#[derive(Debug, Clone)]
pub enum TradeEvent {
    OrderPlaced {
        strategy: String,
        plan: TradePlan,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    },
    OrderRejected {
        strategy: String,
        instrument: String,
        reason: String,
    },
    PositionClosed {
        instrument: String,
        reason: CloseReason,
        profit: Option<f64>,
        at: DateTime<Utc>,
    },
    PositionReopened {
        plan: TradePlan,
        ticket_id: TicketId,
    },
    CollaboratorFailed {
        instrument: String,
        error: String,
    },
}
