use common::{PriceSeries, Result, Signal};

use super::SignalDetector;
use crate::frame::{Column, IndicatorFrame};

/// Fast EMA crossing a slow EMA shifted back `slow_shift` bars, confirmed by
/// the colour of the crossing candle.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaCross {
    pub fast: usize,
    pub slow: usize,
    pub slow_shift: usize,
}

impl Default for EmaCross {
    fn default() -> Self {
        Self {
            fast: 20,
            slow: 50,
            slow_shift: 10,
        }
    }
}

impl SignalDetector for EmaCross {
    fn name(&self) -> &'static str {
        "ema_cross"
    }

    fn lookback(&self) -> usize {
        self.slow.max(self.fast).max(1) + self.slow_shift + 1
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone())
            .with(Column::ema(self.fast))
            .with(Column::ema(self.slow))
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        if t < self.slow_shift + 1 {
            return Ok(Signal::none(t));
        }
        let fast = frame.column(Column::ema(self.fast))?;
        let slow = frame.column(Column::ema(self.slow))?;
        let shifted = |i: usize| slow[i - self.slow_shift];
        let candle = &frame.series().candles()[t];

        let signal = if fast[t - 1] < shifted(t - 1) && fast[t] > shifted(t) && candle.is_green() {
            Signal::long(t)
        } else if fast[t - 1] > shifted(t - 1) && fast[t] < shifted(t) && candle.is_red() {
            Signal::short(t)
        } else {
            Signal::none(t)
        };
        Ok(signal)
    }
}
