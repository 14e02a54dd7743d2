use common::{Candle, OrderSide, PriceSeries, Result, Signal, Swing};

use super::SignalDetector;
use crate::frame::IndicatorFrame;
use crate::indicators::rolling::{argmax, argmin};
use crate::levels::{fib_level, FibDirection};

const PULLBACK_RATIO: f64 = 0.618;

/// Break of structure followed by a pullback into the 0.618 retracement of
/// the breakout range.
///
/// A break stays pending for `pending_bars` bars. The first close that reaches
/// the retracement fires the signal once; a close beyond the far end of the
/// range cancels the break.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureBreak {
    pub pending_bars: usize,
    pub range_bars: usize,
}

impl Default for StructureBreak {
    fn default() -> Self {
        Self {
            pending_bars: 10,
            range_bars: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pullback {
    Idle,
    Awaiting(Swing),
    Fired(Swing),
}

/// `close[t]` closes above the previous high after the previous close sat under it.
pub fn bos_buy(candles: &[Candle], t: usize) -> bool {
    t > 0 && t < candles.len() && {
        let prev = &candles[t - 1];
        candles[t].close > prev.high && prev.close < prev.high
    }
}

pub fn bos_sell(candles: &[Candle], t: usize) -> bool {
    t > 0 && t < candles.len() && {
        let prev = &candles[t - 1];
        candles[t].close < prev.low && prev.close > prev.low
    }
}

impl StructureBreak {
    /// Max high / min low over the `range_bars` bars ending at the break.
    fn breakout_range(&self, series: &PriceSeries, b: usize) -> Option<Swing> {
        let start = (b + 1).saturating_sub(self.range_bars.max(1));
        let highs = series.highs();
        let lows = series.lows();
        let high_index = argmax(&highs, start, b + 1)?;
        let low_index = argmin(&lows, start, b + 1)?;
        Some(Swing {
            high: highs[high_index],
            high_index,
            low: lows[low_index],
            low_index,
        })
    }

    fn pullback(&self, series: &PriceSeries, t: usize, side: OrderSide) -> Pullback {
        let candles = series.candles();
        let is_break = match side {
            OrderSide::Buy => bos_buy,
            OrderSide::Sell => bos_sell,
        };
        let earliest = t.saturating_sub(self.pending_bars).max(1);
        let Some(b) = (earliest..=t).rev().find(|&b| is_break(candles, b)) else {
            return Pullback::Idle;
        };
        let Some(range) = self.breakout_range(series, b) else {
            return Pullback::Idle;
        };

        for (i, candle) in candles.iter().enumerate().take(t + 1).skip(b + 1) {
            let close = candle.close;
            let (invalid, touched) = match side {
                OrderSide::Buy => (
                    close < range.low,
                    close <= fib_level(range.high, range.low, PULLBACK_RATIO, FibDirection::Up),
                ),
                OrderSide::Sell => (
                    close > range.high,
                    close >= fib_level(range.high, range.low, PULLBACK_RATIO, FibDirection::Down),
                ),
            };
            if invalid {
                return Pullback::Idle;
            }
            if touched {
                // fires once, on the first touching bar
                return if i == t {
                    Pullback::Fired(range)
                } else {
                    Pullback::Idle
                };
            }
        }
        Pullback::Awaiting(range)
    }
}

impl SignalDetector for StructureBreak {
    fn name(&self) -> &'static str {
        "structure_break"
    }

    fn lookback(&self) -> usize {
        self.range_bars.max(1) + 1
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone())
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        let series = frame.series();
        let long = self.pullback(series, t, OrderSide::Buy);
        let short = self.pullback(series, t, OrderSide::Sell);

        let signal = match (long, short) {
            (Pullback::Fired(range), _) => Signal::long(t).with_swing(range),
            (_, Pullback::Fired(range)) => Signal::short(t).with_swing(range),
            (Pullback::Awaiting(range), _) | (_, Pullback::Awaiting(range)) => {
                let mut signal = Signal::none(t).with_swing(range);
                signal.meta.awaiting_pullback = true;
                signal
            }
            (Pullback::Idle, Pullback::Idle) => Signal::none(t),
        };
        Ok(signal)
    }
}
