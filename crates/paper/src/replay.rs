use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use common::{Candle, Error, InstrumentMeta, PriceSeries, Result};

use crate::PaperBroker;

/// One instrument's recorded bars plus the broker constraints to simulate.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentFeed {
    pub meta: InstrumentMeta,
    /// Added to each close to form the ask.
    #[serde(default)]
    pub spread: f64,
    pub candles: PriceSeries,
}

/// Recorded candles replayed into a [`PaperBroker`] one bar at a time.
///
/// The JSON file maps instrument names to [`InstrumentFeed`]s:
///
/// ```json
/// { "EURUSD": { "meta": { ... }, "spread": 0.0002, "candles": [ ... ] } }
/// ```
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    instruments: BTreeMap<String, InstrumentFeed>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read replay feed '{}': {e}", path.display()))
        })?;
        let feed = Self::parse(&content)?;
        info!(
            path = %path.display(),
            instruments = feed.instruments.len(),
            bars = feed.total_bars(),
            "Replay feed loaded"
        );
        Ok(feed)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let instruments: BTreeMap<String, InstrumentFeed> = serde_json::from_str(content)?;
        if instruments.is_empty() {
            return Err(Error::Config("replay feed contains no instruments".into()));
        }
        Ok(Self {
            instruments,
            cursor: 0,
        })
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(String::as_str)
    }

    fn total_bars(&self) -> usize {
        self.instruments
            .values()
            .map(|f| f.candles.len())
            .max()
            .unwrap_or(0)
    }

    /// Bars not yet revealed on the longest instrument.
    pub fn remaining(&self) -> usize {
        self.total_bars().saturating_sub(self.cursor)
    }

    /// Registers every instrument with the broker.
    pub async fn install(&self, broker: &PaperBroker) {
        for (instrument, feed) in &self.instruments {
            broker.add_instrument(instrument, feed.meta, feed.spread).await;
        }
    }

    /// Reveals the next bar of every instrument. Returns `false` once the feed
    /// is exhausted.
    pub async fn advance(&mut self, broker: &PaperBroker) -> Result<bool> {
        if self.remaining() == 0 {
            return Ok(false);
        }
        for (instrument, feed) in &self.instruments {
            let Some(candle) = feed.candles.get(self.cursor) else {
                continue;
            };
            let closed = broker.push_candle(instrument, *candle).await?;
            if !closed.is_empty() {
                debug!(pair = %instrument, closed = closed.len(), "Replay bar closed positions");
            }
        }
        self.cursor += 1;
        Ok(true)
    }

    /// Reveals up to `bars` bars before trading starts. Returns how many were revealed.
    pub async fn warm_up(&mut self, broker: &PaperBroker, bars: usize) -> Result<usize> {
        let mut revealed = 0;
        while revealed < bars && self.advance(broker).await? {
            revealed += 1;
        }
        if revealed < bars {
            warn!(requested = bars, revealed, "Replay feed shorter than warm-up");
        }
        Ok(revealed)
    }

    /// The next bar `advance` would reveal for `instrument`.
    pub fn peek(&self, instrument: &str) -> Option<&Candle> {
        self.instruments.get(instrument)?.candles.get(self.cursor)
    }
}
