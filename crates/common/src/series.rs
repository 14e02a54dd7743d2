use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bar. Immutable once produced by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// Top of the candle body.
    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    /// Bottom of the candle body.
    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }
}

/// Chronological candle sequence, index 0 = oldest.
///
/// Timestamps are strictly ascending; `new` rejects anything else so every
/// consumer can index by position without re-checking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        if let Some(pos) = candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(Error::InvalidSeries(format!(
                "timestamp at index {} ({}) does not follow {}",
                pos + 1,
                candles[pos + 1].timestamp,
                candles[pos].timestamp
            )));
        }
        Ok(Self { candles })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Fails with `InsufficientData` when the series is shorter than `lookback`.
    pub fn require(&self, lookback: usize) -> Result<()> {
        if self.candles.len() < lookback {
            return Err(Error::InsufficientData {
                have: self.candles.len(),
                need: lookback,
            });
        }
        Ok(())
    }

    /// `S[0..end]`, clamped to the series length.
    pub fn prefix(&self, end: usize) -> PriceSeries {
        PriceSeries {
            candles: self.candles[..end.min(self.candles.len())].to_vec(),
        }
    }

    pub fn opens(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Highest high and lowest low over the whole series.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.candles.is_empty() {
            return None;
        }
        let high = self
            .candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let low = self
            .candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min);
        Some((high, low))
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let candles = Vec::<Candle>::deserialize(deserializer)?;
        PriceSeries::new(candles).map_err(serde::de::Error::custom)
    }
}
