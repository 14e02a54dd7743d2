//! Fibonacci retracement/extension and classic pivot-point levels.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::{Error, PriceSeries, Result};

/// Fibonacci ratio stored in thousandths so it can key a map exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FibRatio(i32);

impl FibRatio {
    pub const fn milli(thousandths: i32) -> Self {
        Self(thousandths)
    }

    pub fn new(ratio: f64) -> Self {
        Self((ratio * 1000.0).round() as i32)
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl std::fmt::Display for FibRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.value())
    }
}

/// Retracement ratios every Fibonacci level set carries.
pub const RETRACEMENTS: [FibRatio; 10] = [
    FibRatio::milli(0),
    FibRatio::milli(236),
    FibRatio::milli(382),
    FibRatio::milli(500),
    FibRatio::milli(618),
    FibRatio::milli(786),
    FibRatio::milli(1000),
    FibRatio::milli(-236),
    FibRatio::milli(-618),
    FibRatio::milli(-1000),
];

/// Extension ratios used by the break-of-structure variants.
pub const EXTENSIONS: [FibRatio; 3] = [
    FibRatio::milli(1414),
    FibRatio::milli(1618),
    FibRatio::milli(2618),
];

/// Name of one level in a [`LevelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LevelKey {
    Fib(FibRatio),
    Pp,
    R1,
    R2,
    R3,
    S1,
    S2,
    S3,
}

impl LevelKey {
    pub fn fib(ratio: f64) -> Self {
        LevelKey::Fib(FibRatio::new(ratio))
    }
}

impl std::fmt::Display for LevelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKey::Fib(r) => write!(f, "{r}"),
            LevelKey::Pp => write!(f, "PP"),
            LevelKey::R1 => write!(f, "R1"),
            LevelKey::R2 => write!(f, "R2"),
            LevelKey::R3 => write!(f, "R3"),
            LevelKey::S1 => write!(f, "S1"),
            LevelKey::S2 => write!(f, "S2"),
            LevelKey::S3 => write!(f, "S3"),
        }
    }
}

impl FromStr for LevelKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = match s.trim().to_ascii_uppercase().as_str() {
            "PP" => LevelKey::Pp,
            "R1" => LevelKey::R1,
            "R2" => LevelKey::R2,
            "R3" => LevelKey::R3,
            "S1" => LevelKey::S1,
            "S2" => LevelKey::S2,
            "S3" => LevelKey::S3,
            other => {
                let ratio: f64 = other
                    .parse()
                    .map_err(|_| Error::Config(format!("unknown level '{s}'")))?;
                LevelKey::fib(ratio)
            }
        };
        Ok(key)
    }
}

impl TryFrom<String> for LevelKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LevelKey> for String {
    fn from(key: LevelKey) -> Self {
        key.to_string()
    }
}

/// Immutable mapping from level names to prices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LevelSet {
    levels: BTreeMap<LevelKey, f64>,
}

impl LevelSet {
    pub fn level(&self, key: LevelKey) -> Option<f64> {
        self.levels.get(&key).copied()
    }

    /// Lookup by display name, e.g. `"0.618"`, `"-1.000"` or `"R1"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        name.parse().ok().and_then(|key| self.level(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LevelKey, f64)> + '_ {
        self.levels.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl FromIterator<(LevelKey, f64)> for LevelSet {
    fn from_iter<I: IntoIterator<Item = (LevelKey, f64)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

/// Which way the measured move ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FibDirection {
    /// Anchor low → high; retracements measured down from the high.
    Up,
    /// Anchor high → low; retracements measured up from the low.
    Down,
}

/// Fibonacci levels over `high`/`low` for the standard ratio set plus extensions.
///
/// With `d = high - low`, for [`FibDirection::Up`]: retracement `r` in
/// `[0, 1]` is `high - d*r`, negative `r` is `high + d*|r|` and extension
/// `r > 1` is `high + d*r`. [`FibDirection::Down`] mirrors around the low.
pub fn fibonacci_levels(high: f64, low: f64, direction: FibDirection) -> LevelSet {
    RETRACEMENTS
        .iter()
        .chain(EXTENSIONS.iter())
        .map(|&ratio| (LevelKey::Fib(ratio), fib_level(high, low, ratio.value(), direction)))
        .collect()
}

/// One Fibonacci level, for ratios outside the standard set.
pub fn fib_level(high: f64, low: f64, ratio: f64, direction: FibDirection) -> f64 {
    let diff = high - low;
    let offset = if ratio > 1.0 {
        diff * ratio
    } else {
        diff * ratio.abs()
    };
    match (direction, ratio < 0.0 || ratio > 1.0) {
        (FibDirection::Up, false) => high - offset,
        (FibDirection::Up, true) => high + offset,
        (FibDirection::Down, false) => low + offset,
        (FibDirection::Down, true) => low - offset,
    }
}

/// Classic floor pivots from the prior completed bar.
pub fn pivot_levels(prev_high: f64, prev_low: f64, prev_close: f64) -> LevelSet {
    let (h, l, c) = (prev_high, prev_low, prev_close);
    let pp = (h + l + c) / 3.0;
    LevelSet::from_iter([
        (LevelKey::Pp, pp),
        (LevelKey::R1, 2.0 * pp - l),
        (LevelKey::S1, 2.0 * pp - h),
        (LevelKey::R2, pp + (h - l)),
        (LevelKey::S2, pp - (h - l)),
        (LevelKey::R3, h + 2.0 * (pp - l)),
        (LevelKey::S3, l - 2.0 * (h - pp)),
    ])
}

/// Pivots for bar `t`, computed from bar `t - 1` (never the bar in progress).
pub fn pivot_levels_for(series: &PriceSeries, t: usize) -> Result<LevelSet> {
    if t == 0 || t >= series.len() {
        return Err(Error::InsufficientData {
            have: series.len(),
            need: t.max(1) + 1,
        });
    }
    let prev = &series.candles()[t - 1];
    Ok(pivot_levels(prev.high, prev.low, prev.close))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Option<f64>, b: f64) {
        let a = a.expect("level missing");
        assert!((a - b).abs() < 1e-9, "expected {b}, got {a}");
    }

    #[test]
    fn uptrend_fib_levels() {
        let levels = fibonacci_levels(110.0, 100.0, FibDirection::Up);
        assert_close(levels.get("0.000"), 110.0);
        assert_close(levels.get("0.618"), 103.82);
        assert_close(levels.get("1.000"), 100.0);
        assert_close(levels.get("-1.000"), 120.0);
        assert_close(levels.get("-0.236"), 112.36);
        assert_close(levels.get("1.618"), 126.18);
        assert_eq!(levels.len(), 13);
    }

    #[test]
    fn downtrend_fib_levels_mirror() {
        let levels = fibonacci_levels(110.0, 100.0, FibDirection::Down);
        assert_close(levels.get("0.000"), 100.0);
        assert_close(levels.get("1.000"), 110.0);
        assert_close(levels.get("0.382"), 103.82);
        assert_close(levels.get("-1.000"), 90.0);
        assert_close(levels.get("1.618"), 83.82);
    }

    #[test]
    fn pivot_scenario() {
        let levels = pivot_levels(50.0, 40.0, 45.0);
        assert_close(levels.level(LevelKey::Pp), 45.0);
        assert_close(levels.level(LevelKey::R1), 50.0);
        assert_close(levels.level(LevelKey::S1), 40.0);
        assert_close(levels.level(LevelKey::R2), 55.0);
        assert_close(levels.level(LevelKey::S2), 35.0);
        assert_close(levels.level(LevelKey::R3), 60.0);
        assert_close(levels.level(LevelKey::S3), 30.0);
    }

    #[test]
    fn level_keys_parse_and_display() {
        assert_eq!("0.618".parse::<LevelKey>().unwrap(), LevelKey::fib(0.618));
        assert_eq!("-1".parse::<LevelKey>().unwrap(), LevelKey::fib(-1.0));
        assert_eq!("r1".parse::<LevelKey>().unwrap(), LevelKey::R1);
        assert_eq!(LevelKey::fib(-1.0).to_string(), "-1.000");
        assert_eq!(LevelKey::fib(0.5).to_string(), "0.500");
        assert!("R9".parse::<LevelKey>().is_err());
    }

    #[test]
    fn pivots_use_prior_bar() {
        use chrono::{TimeZone, Utc};
        let bar = |i: i64, h: f64, l: f64, c: f64| common::Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 300, 0).unwrap(),
            open: c,
            high: h,
            low: l,
            close: c,
            volume: 0.0,
        };
        let series =
            PriceSeries::new(vec![bar(0, 50.0, 40.0, 45.0), bar(1, 99.0, 1.0, 60.0)]).unwrap();
        let levels = pivot_levels_for(&series, 1).unwrap();
        assert_close(levels.level(LevelKey::Pp), 45.0);
        assert!(pivot_levels_for(&series, 0).is_err());
    }
}
