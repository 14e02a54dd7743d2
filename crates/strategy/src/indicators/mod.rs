//! Indicator library over a [`PriceSeries`].
//!
//! Outputs align index-for-index with the input candles. Warm-up values are
//! NaN, never zero, and a value at index `i` only depends on candles `0..=i`.

pub mod ma;
pub mod macd;
pub mod rolling;
pub mod rsi;

use common::PriceSeries;

pub use ma::MaKind;
pub use macd::Macd;

/// Moving average of closes.
pub fn moving_average(series: &PriceSeries, length: usize, kind: MaKind) -> Vec<f64> {
    ma::compute(&series.closes(), length, kind)
}

pub fn ema(series: &PriceSeries, length: usize) -> Vec<f64> {
    ma::ema(&series.closes(), length)
}

/// Wilder RSI of closes.
pub fn rsi(series: &PriceSeries, length: usize) -> Vec<f64> {
    rsi::wilder_rsi(&series.closes(), length)
}

pub fn macd(series: &PriceSeries, fast: usize, slow: usize, signal: usize) -> Macd {
    macd::macd_lines(&series.closes(), fast, slow, signal)
}

/// Rolling maximum of highs.
pub fn rolling_max(series: &PriceSeries, window: usize) -> Vec<f64> {
    rolling::max_over(&series.highs(), window)
}

/// Rolling minimum of lows.
pub fn rolling_min(series: &PriceSeries, window: usize) -> Vec<f64> {
    rolling::min_over(&series.lows(), window)
}
