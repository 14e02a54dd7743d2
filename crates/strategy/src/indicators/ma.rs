//! Moving averages over a value column.
//!
//! Every function returns a vector aligned with its input. Values before the
//! warm-up index are NaN, and a NaN inside a window yields NaN.

use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaKind {
    #[default]
    Sma,
    Ema,
    Wma,
    Hma,
    Rma,
}

impl MaKind {
    /// Index of the first defined value for a finite input of this kind.
    pub fn warmup(self, length: usize) -> usize {
        let length = length.max(1);
        match self {
            MaKind::Hma if length >= 2 => length - 1 + hma_sqrt_len(length) - 1,
            _ => length - 1,
        }
    }
}

/// Unknown names fall back to SMA.
impl FromStr for MaKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "EMA" => MaKind::Ema,
            "WMA" => MaKind::Wma,
            "HMA" => MaKind::Hma,
            "RMA" => MaKind::Rma,
            _ => MaKind::Sma,
        })
    }
}

impl From<String> for MaKind {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<MaKind> for String {
    fn from(kind: MaKind) -> Self {
        kind.to_string()
    }
}

impl std::fmt::Display for MaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaKind::Sma => write!(f, "SMA"),
            MaKind::Ema => write!(f, "EMA"),
            MaKind::Wma => write!(f, "WMA"),
            MaKind::Hma => write!(f, "HMA"),
            MaKind::Rma => write!(f, "RMA"),
        }
    }
}

pub fn compute(values: &[f64], length: usize, kind: MaKind) -> Vec<f64> {
    match kind {
        MaKind::Sma => sma(values, length),
        MaKind::Ema => ema(values, length),
        MaKind::Wma => wma(values, length),
        MaKind::Hma => hma(values, length),
        MaKind::Rma => rma(values, length),
    }
}

pub fn sma(values: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if length == 0 {
        return out;
    }
    for i in (length - 1)..values.len() {
        let window = &values[i + 1 - length..=i];
        out[i] = window.iter().sum::<f64>() / length as f64;
    }
    out
}

/// EMA with `alpha = 2 / (length + 1)`, seeded with the SMA of the first
/// `length` defined values. Leading NaNs are skipped, so the function can be
/// chained onto another indicator's output.
pub fn ema(values: &[f64], length: usize) -> Vec<f64> {
    smoothed(values, length, 2.0 / (length as f64 + 1.0))
}

/// Wilder's moving average (`alpha = 1 / length`), SMA-seeded.
pub fn rma(values: &[f64], length: usize) -> Vec<f64> {
    smoothed(values, length, 1.0 / length as f64)
}

/// Linearly weighted average, newest value weighted `length`.
pub fn wma(values: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if length == 0 {
        return out;
    }
    let denom = (length * (length + 1)) as f64 / 2.0;
    for i in (length - 1)..values.len() {
        let window = &values[i + 1 - length..=i];
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(j, v)| v * (j + 1) as f64)
            .sum();
        out[i] = weighted / denom;
    }
    out
}

/// Hull moving average: `WMA(2 * WMA(n/2) - WMA(n), floor(sqrt(n)))`.
pub fn hma(values: &[f64], length: usize) -> Vec<f64> {
    if length < 2 {
        return wma(values, length);
    }
    let half = wma(values, length / 2);
    let full = wma(values, length);
    let raw: Vec<f64> = half
        .iter()
        .zip(&full)
        .map(|(h, f)| 2.0 * h - f)
        .collect();
    wma(&raw, hma_sqrt_len(length))
}

fn hma_sqrt_len(length: usize) -> usize {
    ((length as f64).sqrt().floor() as usize).max(1)
}

fn smoothed(values: &[f64], length: usize, alpha: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if length == 0 {
        return out;
    }
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    let seed_end = start + length;
    if seed_end > values.len() {
        return out;
    }

    let mut prev = values[start..seed_end].iter().sum::<f64>() / length as f64;
    out[seed_end - 1] = prev;
    for i in seed_end..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}
