use common::{PriceSeries, Result, Signal, Swing};

use super::ema_confluence::{ema_level, EmaLevel};
use super::SignalDetector;
use crate::frame::{Column, IndicatorFrame};
use crate::indicators::rolling::{argmax, argmin};
use crate::levels::{fibonacci_levels, FibDirection, LevelKey};

/// Pullback into a Fibonacci retracement of the recent swing, in the direction
/// of the EMA trend.
///
/// The swing is measured over `[t - backcandles, t - gap)`; the `gap` bars
/// before `t` must hold on the far side of the level while price returns to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FibZone {
    pub ema_length: usize,
    pub backcandles: usize,
    pub gap: usize,
    /// Maximum |close - level| that counts as "at the level".
    pub zone_threshold: f64,
    /// Minimum swing height.
    pub price_diff_threshold: f64,
}

impl Default for FibZone {
    fn default() -> Self {
        Self {
            ema_length: 150,
            backcandles: 15,
            gap: 5,
            zone_threshold: 0.001,
            price_diff_threshold: 0.01,
        }
    }
}

impl FibZone {
    /// Swing extremes over the measuring window ending `gap` bars before `t`.
    pub fn swing(&self, series: &PriceSeries, t: usize) -> Option<Swing> {
        let start = t.checked_sub(self.backcandles)?;
        let end = t.checked_sub(self.gap)?;
        let highs = series.highs();
        let lows = series.lows();
        let high_index = argmax(&highs, start, end)?;
        let low_index = argmin(&lows, start, end)?;
        Some(Swing {
            high: highs[high_index],
            high_index,
            low: lows[low_index],
            low_index,
        })
    }
}

impl SignalDetector for FibZone {
    fn name(&self) -> &'static str {
        "fib_zone"
    }

    fn lookback(&self) -> usize {
        self.ema_length.max(1) + self.backcandles
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone()).with(Column::ema(self.ema_length))
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        let series = frame.series();
        let Some(swing) = self.swing(series, t) else {
            return Ok(Signal::none(t));
        };
        if swing.high - swing.low <= self.price_diff_threshold {
            return Ok(Signal::none(t));
        }

        let ema = frame.column(Column::ema(self.ema_length))?;
        let trend = ema_level(series.candles(), ema, t, self.backcandles);
        let levels = fibonacci_levels(swing.high, swing.low, FibDirection::Down);
        let candles = series.candles();
        let close = candles[t].close;
        let held = &candles[t - self.gap..t];

        let signal = if swing.low_index < swing.high_index && trend == EmaLevel::Up {
            match levels.level(LevelKey::fib(0.382)) {
                Some(level)
                    if (close - level).abs() < self.zone_threshold
                        && held.iter().all(|c| c.high > level) =>
                {
                    Signal::long(t).with_swing(swing)
                }
                _ => Signal::none(t),
            }
        } else if swing.high_index < swing.low_index && trend == EmaLevel::Down {
            match levels.level(LevelKey::fib(0.618)) {
                Some(level)
                    if (close - level).abs() < self.zone_threshold
                        && held.iter().all(|c| c.low < level) =>
                {
                    Signal::short(t).with_swing(swing)
                }
                _ => Signal::none(t),
            }
        } else {
            Signal::none(t)
        };
        Ok(signal)
    }
}
