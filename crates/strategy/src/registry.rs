use std::collections::HashMap;

use tracing::info;

use common::{Error, PriceSeries, Result, Signal};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::detectors::{
    Detector, EmaConfluence, EmaCross, FibZone, MaBreakout, PivotTrend, SignalDetector,
    StructureBreak,
};
use crate::indicators::MaKind;
use crate::profile::LevelSource;

/// One configured strategy: its settings plus the detector built from them.
#[derive(Debug, Clone)]
pub struct RegisteredStrategy {
    pub config: StrategyConfig,
    pub detector: Detector,
}

impl RegisteredStrategy {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn trades(&self, instrument: &str) -> bool {
        self.config.pairs.iter().any(|p| p == instrument)
    }

    pub fn detect(&self, series: &PriceSeries) -> Result<Signal> {
        self.detector.detect(series)
    }
}

/// All configured strategies, in config-file order.
///
/// When several strategies fire for the same instrument the first one wins,
/// so file order is the tie-break.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<RegisteredStrategy>,
}

impl StrategyRegistry {
    /// Build the registry from config, failing on unknown types or bad params.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut strategies = Vec::with_capacity(file_cfg.strategies.len());

        for cfg in &file_cfg.strategies {
            let detector = build_detector(cfg)?;
            check_profile(cfg, &detector)?;
            check_candles(cfg, &detector)?;
            info!(
                name = %cfg.name,
                detector = detector.name(),
                pairs = ?cfg.pairs,
                lookback = detector.lookback(),
                "Registered strategy"
            );
            strategies.push(RegisteredStrategy {
                config: cfg.clone(),
                detector,
            });
        }

        Ok(Self { strategies })
    }

    pub fn strategies(&self) -> &[RegisteredStrategy] {
        &self.strategies
    }

    /// Strategies trading `instrument`, in config order.
    pub fn for_instrument<'a>(
        &'a self,
        instrument: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredStrategy> + 'a {
        self.strategies.iter().filter(move |s| s.trades(instrument))
    }

    /// Every configured instrument, first appearance first.
    pub fn instruments(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for pair in self.strategies.iter().flat_map(|s| &s.config.pairs) {
            if !seen.contains(pair) {
                seen.push(pair.clone());
            }
        }
        seen
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ─── Detector builders ────────────────────────────────────────────────────────

fn build_detector(cfg: &StrategyConfig) -> Result<Detector> {
    let p = &cfg.params;
    let detector = match cfg.strategy_type.as_str() {
        "ma_breakout" => {
            let d = MaBreakout::default();
            Detector::MaBreakout(MaBreakout {
                ma_kind: param_str(p, "ma_type")?
                    .map(|s| s.parse::<MaKind>().unwrap_or_default())
                    .unwrap_or(d.ma_kind),
                ma_length: positive(cfg, "ma_length", param_usize(p, "ma_length", d.ma_length)?)?,
                window: positive(cfg, "window", param_usize(p, "window", d.window)?)?,
            })
        }
        "ema_confluence" => {
            let d = EmaConfluence::default();
            Detector::EmaConfluence(EmaConfluence {
                ema_length: positive(cfg, "ema_length", param_usize(p, "ema_length", d.ema_length)?)?,
                backcandles: param_usize(p, "backcandles", d.backcandles)?,
            })
        }
        "fib_zone" => {
            let d = FibZone::default();
            let zone = FibZone {
                ema_length: positive(cfg, "ema_length", param_usize(p, "ema_length", d.ema_length)?)?,
                backcandles: param_usize(p, "backcandles", d.backcandles)?,
                gap: param_usize(p, "gap", d.gap)?,
                zone_threshold: param_f64(p, "zone_threshold", d.zone_threshold)?,
                price_diff_threshold: param_f64(p, "price_diff_threshold", d.price_diff_threshold)?,
            };
            if zone.gap >= zone.backcandles {
                return Err(Error::Config(format!(
                    "strategy '{}': gap ({}) must be smaller than backcandles ({})",
                    cfg.name, zone.gap, zone.backcandles
                )));
            }
            Detector::FibZone(zone)
        }
        "structure_break" => {
            let d = StructureBreak::default();
            Detector::StructureBreak(StructureBreak {
                pending_bars: param_usize(p, "pending_bars", d.pending_bars)?,
                range_bars: positive(cfg, "range_bars", param_usize(p, "range_bars", d.range_bars)?)?,
            })
        }
        "pivot_trend" => {
            let d = PivotTrend::default();
            Detector::PivotTrend(PivotTrend {
                ema_fast: positive(cfg, "ema_fast", param_usize(p, "ema_fast", d.ema_fast)?)?,
                ema_slow: positive(cfg, "ema_slow", param_usize(p, "ema_slow", d.ema_slow)?)?,
                rsi_length: positive(cfg, "rsi_length", param_usize(p, "rsi_length", d.rsi_length)?)?,
            })
        }
        "ema_cross" => {
            let d = EmaCross::default();
            Detector::EmaCross(EmaCross {
                fast: positive(cfg, "fast", param_usize(p, "fast", d.fast)?)?,
                slow: positive(cfg, "slow", param_usize(p, "slow", d.slow)?)?,
                slow_shift: param_usize(p, "slow_shift", d.slow_shift)?,
            })
        }
        other => {
            return Err(Error::Config(format!(
                "strategy '{}': unknown type '{other}'",
                cfg.name
            )))
        }
    };
    Ok(detector)
}

/// Swing-based profiles only make sense for detectors that attach a swing.
fn check_profile(cfg: &StrategyConfig, detector: &Detector) -> Result<()> {
    let attaches_swing = matches!(detector, Detector::FibZone(_) | Detector::StructureBreak(_));
    if cfg.profile.mapping().source == LevelSource::Swing && !attaches_swing {
        return Err(Error::Config(format!(
            "strategy '{}': profile {:?} needs a swing, which {} does not provide",
            cfg.name,
            cfg.profile,
            detector.name()
        )));
    }
    Ok(())
}

/// A fetch shorter than the detector's lookback could never produce a signal.
fn check_candles(cfg: &StrategyConfig, detector: &Detector) -> Result<()> {
    let need = detector.lookback();
    if cfg.candles < need {
        return Err(Error::Config(format!(
            "strategy '{}': candles = {} but {} needs at least {need}",
            cfg.name,
            cfg.candles,
            detector.name()
        )));
    }
    Ok(())
}

fn positive(cfg: &StrategyConfig, key: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::Config(format!(
            "strategy '{}': param '{key}' must be positive",
            cfg.name
        )));
    }
    Ok(value)
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_float()
            .or_else(|| v.as_integer().map(|i| i as f64))
            .ok_or_else(|| Error::Config(format!("param '{key}' must be a number, got {v}"))),
    }
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| {
                Error::Config(format!("param '{key}' must be a non-negative integer, got {v}"))
            }),
    }
}

fn param_str<'a>(params: &'a HashMap<String, toml::Value>, key: &str) -> Result<Option<&'a str>> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| Error::Config(format!("param '{key}' must be a string, got {v}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(toml: &str) -> Result<StrategyRegistry> {
        StrategyRegistry::from_config(&StrategyFileConfig::parse(toml)?)
    }

    #[test]
    fn builds_detectors_with_params_and_defaults() {
        let reg = registry(
            r#"
            [[strategy]]
            type = "ma_breakout"
            name = "a"
            pairs = ["EURUSD"]
            quantity = 0.1
            [strategy.params]
            ma_type = "ema"
            ma_length = 21

            [[strategy]]
            type = "fib_zone"
            name = "b"
            pairs = ["EURUSD", "GBPUSD"]
            quantity = 0.1
            profile = "fib_zone"
            [strategy.params]
            zone_threshold = 1
            "#,
        )
        .unwrap();

        match &reg.strategies()[0].detector {
            Detector::MaBreakout(d) => {
                assert_eq!(d.ma_kind, MaKind::Ema);
                assert_eq!(d.ma_length, 21);
                assert_eq!(d.window, 5);
            }
            other => panic!("unexpected detector {other:?}"),
        }
        match &reg.strategies()[1].detector {
            Detector::FibZone(d) => {
                assert_eq!(d.zone_threshold, 1.0);
                assert_eq!(d.ema_length, 150);
            }
            other => panic!("unexpected detector {other:?}"),
        }
        assert_eq!(reg.instruments(), vec!["EURUSD", "GBPUSD"]);
        let names: Vec<_> = reg.for_instrument("EURUSD").map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "martingale"
            name = "x"
            pairs = ["EURUSD"]
            quantity = 1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("martingale")));
    }

    #[test]
    fn malformed_param_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "ema_cross"
            name = "x"
            pairs = ["BTCUSDT"]
            quantity = 1.0
            [strategy.params]
            fast = "twenty"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn swing_profile_needs_swing_detector() {
        let err = registry(
            r#"
            [[strategy]]
            type = "pivot_trend"
            name = "x"
            pairs = ["EURUSD"]
            quantity = 1.0
            profile = "fib_zone"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn fetch_shorter_than_lookback_is_rejected() {
        let config = |candles: usize| {
            format!(
                r#"
                [[strategy]]
                type = "fib_zone"
                name = "short fetch"
                pairs = ["EURUSD"]
                candles = {candles}
                quantity = 1.0
                profile = "fib_zone"
                "#
            )
        };
        // ema 150 + 15 back candles
        let err = registry(&config(100)).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("165")));
        assert!(registry(&config(165)).is_ok());
    }

    #[test]
    fn shipped_sample_config_builds() {
        let file = StrategyFileConfig::parse(include_str!("../../../config/strategies.toml")).unwrap();
        let reg = StrategyRegistry::from_config(&file).unwrap();
        assert_eq!(reg.strategies().len(), 6);
        assert_eq!(reg.instruments(), vec!["EURUSD", "GBPUSD", "USDJPY"]);
        let gbp = &reg.strategies()[0].config;
        assert_eq!(gbp.exit_policy("GBPUSD").profit_threshold, 3.0);
        assert_eq!(gbp.exit_policy("EURUSD").profit_threshold, 10.0);
    }
}
