use common::{Candle, PriceSeries, Result, Signal};

use super::SignalDetector;
use crate::frame::{Column, IndicatorFrame};

/// Position of recent candle bodies relative to an EMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmaLevel {
    #[default]
    Neutral = 0,
    /// Every body strictly below the EMA.
    Down = 1,
    /// Every body strictly above the EMA.
    Up = 2,
    Both = 3,
}

/// Classifies bars `t - backcandles ..= t`. Any undefined EMA value yields `Neutral`.
pub fn ema_level(candles: &[Candle], ema: &[f64], t: usize, backcandles: usize) -> EmaLevel {
    let Some(start) = t.checked_sub(backcandles) else {
        return EmaLevel::Neutral;
    };
    if t >= candles.len() || t >= ema.len() {
        return EmaLevel::Neutral;
    }
    let mut up = true;
    let mut down = true;
    for i in start..=t {
        if ema[i].is_nan() {
            return EmaLevel::Neutral;
        }
        up &= candles[i].body_low() > ema[i];
        down &= candles[i].body_high() < ema[i];
    }
    match (up, down) {
        (true, true) => EmaLevel::Both,
        (true, false) => EmaLevel::Up,
        (false, true) => EmaLevel::Down,
        (false, false) => EmaLevel::Neutral,
    }
}

/// `ema_level` at every bar.
pub fn ema_levels(series: &PriceSeries, ema: &[f64], backcandles: usize) -> Vec<EmaLevel> {
    (0..series.len())
        .map(|t| ema_level(series.candles(), ema, t, backcandles))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmaConfluence {
    pub ema_length: usize,
    pub backcandles: usize,
}

impl Default for EmaConfluence {
    fn default() -> Self {
        Self {
            ema_length: 150,
            backcandles: 15,
        }
    }
}

impl SignalDetector for EmaConfluence {
    fn name(&self) -> &'static str {
        "ema_confluence"
    }

    fn lookback(&self) -> usize {
        self.ema_length.max(1) + self.backcandles
    }

    fn prepare(&self, series: &PriceSeries) -> IndicatorFrame {
        IndicatorFrame::new(series.clone()).with(Column::ema(self.ema_length))
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Result<Signal> {
        let t = frame.last_index()?;
        let ema = frame.column(Column::ema(self.ema_length))?;
        let signal = match ema_level(frame.series().candles(), ema, t, self.backcandles) {
            EmaLevel::Up => Signal::long(t),
            EmaLevel::Down => Signal::short(t),
            EmaLevel::Neutral | EmaLevel::Both => Signal::none(t),
        };
        Ok(signal)
    }
}
