//! Signal detectors sharing one indicator and level library.
//!
//! Every detector evaluates the last bar of the series it is given and holds
//! no state between calls.

pub mod ema_confluence;
pub mod ema_cross;
pub mod fib_zone;
pub mod ma_breakout;
pub mod pivot_trend;
pub mod structure_break;

pub use ema_confluence::{EmaConfluence, EmaLevel};
pub use ema_cross::EmaCross;
pub use fib_zone::FibZone;
pub use ma_breakout::MaBreakout;
pub use pivot_trend::PivotTrend;
pub use structure_break::StructureBreak;

use common::{PriceSeries, Result, Signal};

use crate::frame::IndicatorFrame;

pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimum number of candles `detect` needs.
    fn lookback(&self) -> usize;

    /// Computes the columns `evaluate` reads.
    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame;

    /// Verdict for the last bar of `frame`.
    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal>;

    fn detect(&self, series: &PriceSeries) -> Result<Signal> {
        series.require(self.lookback())?;
        let frame = self.prepare(series);
        self.evaluate(&frame)
    }
}

/// Closed set of detector variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Detector {
    MaBreakout(MaBreakout),
    EmaConfluence(EmaConfluence),
    FibZone(FibZone),
    StructureBreak(StructureBreak),
    PivotTrend(PivotTrend),
    EmaCross(EmaCross),
}

impl Detector {
    fn inner(&self) -> &dyn SignalDetector {
        match self {
            Detector::MaBreakout(d) => d,
            Detector::EmaConfluence(d) => d,
            Detector::FibZone(d) => d,
            Detector::StructureBreak(d) => d,
            Detector::PivotTrend(d) => d,
            Detector::EmaCross(d) => d,
        }
    }
}

impl SignalDetector for Detector {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn lookback(&self) -> usize {
        self.inner().lookback()
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        self.inner().prepare(series)
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        self.inner().evaluate(frame)
    }
}
