use common::{PriceSeries, Result, Signal};

use super::SignalDetector;
use crate::frame::{Column, IndicatorFrame};
use crate::levels::{pivot_levels_for, LevelKey};

/// Trend filter (close vs. two EMAs, RSI vs. 50) combined with the close
/// sitting between the pivot point and the first support/resistance.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTrend {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_length: usize,
}

impl Default for PivotTrend {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            rsi_length: 14,
        }
    }
}

impl SignalDetector for PivotTrend {
    fn name(&self) -> &'static str {
        "pivot_trend"
    }

    fn lookback(&self) -> usize {
        self.ema_fast
            .max(self.ema_slow)
            .max(self.rsi_length + 1)
            .max(2)
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone())
            .with(Column::ema(self.ema_fast))
            .with(Column::ema(self.ema_slow))
            .with(Column::Rsi(self.rsi_length))
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        let pivots = pivot_levels_for(frame.series(), t)?;
        let close = frame.series().candles()[t].close;
        let fast = frame.value(Column::ema(self.ema_fast), t)?;
        let slow = frame.value(Column::ema(self.ema_slow), t)?;
        let rsi = frame.value(Column::Rsi(self.rsi_length), t)?;

        let (Some(pp), Some(r1), Some(s1)) = (
            pivots.level(LevelKey::Pp),
            pivots.level(LevelKey::R1),
            pivots.level(LevelKey::S1),
        ) else {
            return Ok(Signal::none(t));
        };

        let bullish = close > fast && fast > slow && rsi > 50.0;
        let bearish = close < fast && fast < slow && rsi < 50.0;

        let signal = if bullish && s1 < close && close < pp {
            Signal::long(t)
        } else if bearish && pp < close && close < r1 {
            Signal::short(t)
        } else {
            Signal::none(t)
        };
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::bar;
    use common::{Candle, Direction};

    /// Trending series, one bar per unit step; bar 58 gets a long wick
    /// `wick` on the trend side.
    fn trending(step: f64, wick: f64) -> PriceSeries {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let close = 150.0 + step * i as f64;
                let open = close - step;
                let mut high = open.max(close) + 0.5;
                let mut low = open.min(close) - 0.5;
                if i == 58 {
                    if step > 0.0 {
                        high = close + wick;
                    } else {
                        low = close - wick;
                    }
                }
                bar(i, open, high, low, close)
            })
            .collect();
        PriceSeries::new(candles).unwrap()
    }

    #[test]
    fn uptrend_dip_under_pivot_is_long() {
        let signal = PivotTrend::default().detect(&trending(1.0, 6.0)).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn downtrend_pop_over_pivot_is_short() {
        let signal = PivotTrend::default().detect(&trending(-1.0, 6.0)).unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn close_above_pivot_is_none() {
        let signal = PivotTrend::default().detect(&trending(1.0, 0.5)).unwrap();
        assert_eq!(signal.direction, Direction::None);
    }
}
