use std::collections::HashMap;

use common::{Error, PriceSeries, Result};

use crate::indicators::{self, MaKind};

/// Indicator column a detector can request on an [`IndicatorFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Ma { kind: MaKind, length: usize },
    Rsi(usize),
    MacdLine { fast: usize, slow: usize, signal: usize },
    MacdSignal { fast: usize, slow: usize, signal: usize },
    /// Rolling maximum of highs.
    RollingMax(usize),
    /// Rolling minimum of lows.
    RollingMin(usize),
}

impl Column {
    pub fn ema(length: usize) -> Self {
        Column::Ma {
            kind: MaKind::Ema,
            length,
        }
    }

    /// Index of the first defined value.
    pub fn warmup(&self) -> usize {
        match *self {
            Column::Ma { kind, length } => kind.warmup(length),
            Column::Rsi(length) => length,
            Column::MacdLine { slow, .. } => slow.saturating_sub(1),
            Column::MacdSignal { slow, signal, .. } => {
                slow.saturating_sub(1) + signal.saturating_sub(1)
            }
            Column::RollingMax(w) | Column::RollingMin(w) => w.saturating_sub(1),
        }
    }

    fn compute(&self, series: &PriceSeries) -> Vec<f64> {
        match *self {
            Column::Ma { kind, length } => indicators::moving_average(series, length, kind),
            Column::Rsi(length) => indicators::rsi(series, length),
            Column::MacdLine { fast, slow, signal } => {
                indicators::macd(series, fast, slow, signal).line
            }
            Column::MacdSignal { fast, slow, signal } => {
                indicators::macd(series, fast, slow, signal).signal
            }
            Column::RollingMax(w) => indicators::rolling_max(series, w),
            Column::RollingMin(w) => indicators::rolling_min(series, w),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Column::Ma { kind, length } => write!(f, "{kind}({length})"),
            Column::Rsi(n) => write!(f, "RSI({n})"),
            Column::MacdLine { fast, slow, signal } => write!(f, "MACD({fast},{slow},{signal})"),
            Column::MacdSignal { fast, slow, signal } => {
                write!(f, "MACD_SIGNAL({fast},{slow},{signal})")
            }
            Column::RollingMax(w) => write!(f, "MAX_HIGH({w})"),
            Column::RollingMin(w) => write!(f, "MIN_LOW({w})"),
        }
    }
}

/// A price series plus the indicator columns computed over it.
///
/// Columns align index-for-index with the candles.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    series: PriceSeries,
    columns: HashMap<Column, Vec<f64>>,
}

impl IndicatorFrame {
    pub fn new(series: PriceSeries) -> Self {
        Self {
            series,
            columns: HashMap::new(),
        }
    }

    /// Computes `column` unless it is already present.
    pub fn with(mut self, column: Column) -> Self {
        if !self.columns.contains_key(&column) {
            let values = column.compute(&self.series);
            self.columns.insert(column, values);
        }
        self
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Index of the bar under evaluation.
    pub fn last_index(&self) -> Result<usize> {
        self.series
            .len()
            .checked_sub(1)
            .ok_or(Error::InsufficientData { have: 0, need: 1 })
    }

    pub fn column(&self, column: Column) -> Result<&[f64]> {
        self.columns
            .get(&column)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingColumn(column.to_string()))
    }

    /// Value of `column` at bar `i`; NaN during warm-up.
    pub fn value(&self, column: Column, i: usize) -> Result<f64> {
        Ok(self.column(column)?.get(i).copied().unwrap_or(f64::NAN))
    }
}
