use common::{PriceSeries, Result, Signal};

use super::SignalDetector;
use crate::frame::{Column, IndicatorFrame};
use crate::indicators::MaKind;

/// Break of structure: close crosses the moving average and clears the
/// extreme of the previous `window` bars in the same bar.
#[derive(Debug, Clone, PartialEq)]
pub struct MaBreakout {
    pub ma_kind: MaKind,
    pub ma_length: usize,
    pub window: usize,
}

impl Default for MaBreakout {
    fn default() -> Self {
        Self {
            ma_kind: MaKind::Hma,
            ma_length: 30,
            window: 5,
        }
    }
}

impl MaBreakout {
    fn ma(&self) -> Column {
        Column::Ma {
            kind: self.ma_kind,
            length: self.ma_length,
        }
    }
}

impl SignalDetector for MaBreakout {
    fn name(&self) -> &'static str {
        "ma_breakout"
    }

    fn lookback(&self) -> usize {
        (self.ma_kind.warmup(self.ma_length) + 2).max(self.window + 1)
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone())
            .with(self.ma())
            .with(Column::RollingMax(self.window))
            .with(Column::RollingMin(self.window))
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        if t == 0 {
            return Ok(Signal::none(t));
        }
        let ma = frame.column(self.ma())?;
        let prior_high = frame.value(Column::RollingMax(self.window), t - 1)?;
        let prior_low = frame.value(Column::RollingMin(self.window), t - 1)?;
        let candles = frame.series().candles();
        let (close, prev_close) = (candles[t].close, candles[t - 1].close);

        // NaN compares false on every branch, so warm-up bars fall through to NONE
        let signal = if close > ma[t] && prev_close <= ma[t - 1] && close > prior_high {
            Signal::long(t)
        } else if close < ma[t] && prev_close >= ma[t - 1] && close < prior_low {
            Signal::short(t)
        } else {
            Signal::none(t)
        };
        Ok(signal)
    }
}
