use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, ExitPolicy, Result, Timeframe};

use crate::profile::StrategyProfile;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "ma_breakout"
/// name = "EURUSD HMA breakout"
/// pairs = ["EURUSD", "GBPUSD"]
/// timeframe = "m5"
/// candles = 100
/// quantity = 0.1
/// profile = "bos_breakout"
///
/// [strategy.params]
/// ma_type = "HMA"
/// ma_length = 30
/// window = 5
///
/// [strategy.exit]
/// profit_threshold = 10.0
/// loss_threshold = 30.0
/// reopen_on_profit_close = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Detector type: "ma_breakout", "ema_confluence", "fib_zone",
    /// "structure_break", "pivot_trend" or "ema_cross".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Instruments this strategy trades, e.g. ["EURUSD"].
    pub pairs: Vec<String>,
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Candles fetched per evaluation.
    #[serde(default = "default_candles")]
    pub candles: usize,
    /// Order volume in lots / base units.
    pub quantity: f64,
    #[serde(default)]
    pub profile: StrategyProfile,
    /// Detector-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
    /// Auto-close policy for positions this strategy opens.
    #[serde(default)]
    pub exit: ExitPolicy,
    /// Per-instrument exit overrides, keyed by instrument.
    #[serde(default)]
    pub exit_overrides: HashMap<String, ExitPolicy>,
}

fn default_candles() -> usize {
    200
}

impl StrategyConfig {
    pub fn exit_policy(&self, instrument: &str) -> &ExitPolicy {
        self.exit_overrides.get(instrument).unwrap_or(&self.exit)
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        for strategy in &cfg.strategies {
            if strategy.pairs.is_empty() {
                return Err(Error::Config(format!(
                    "strategy '{}' lists no pairs",
                    strategy.name
                )));
            }
            if strategy.quantity.is_nan() || strategy.quantity <= 0.0 {
                return Err(Error::Config(format!(
                    "strategy '{}' has non-positive quantity {}",
                    strategy.name, strategy.quantity
                )));
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[strategy]]
        type = "pivot_trend"
        name = "Pivot"
        pairs = ["EURUSD", "USDJPY"]
        timeframe = "h1"
        quantity = 0.1
        profile = "pivot_trend"

        [strategy.exit]
        profit_threshold = 5.0

        [strategy.exit_overrides.USDJPY]
        profit_threshold = 500.0
        reopen_on_loss_close = true

        [[strategy]]
        type = "ma_breakout"
        name = "Breakout"
        pairs = ["BTCUSDT"]
        quantity = 0.001

        [strategy.params]
        ma_type = "EMA"
        ma_length = 21
    "#;

    #[test]
    fn parses_strategy_tables() {
        let cfg = StrategyFileConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.strategies.len(), 2);
        let pivot = &cfg.strategies[0];
        assert_eq!(pivot.timeframe, Timeframe::H1);
        assert_eq!(pivot.candles, 200);
        assert_eq!(pivot.profile, StrategyProfile::PivotTrend);
        assert_eq!(pivot.exit_policy("EURUSD").profit_threshold, 5.0);
        let jpy = pivot.exit_policy("USDJPY");
        assert_eq!(jpy.profit_threshold, 500.0);
        assert!(jpy.reopen_on_loss_close);

        let breakout = &cfg.strategies[1];
        assert_eq!(breakout.timeframe, Timeframe::M5);
        assert_eq!(breakout.profile, StrategyProfile::BosBreakout);
        assert_eq!(breakout.exit, ExitPolicy::default());
    }

    #[test]
    fn rejects_empty_pairs() {
        let err = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            type = "ema_cross"
            name = "x"
            pairs = []
            quantity = 1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = StrategyFileConfig::load("/nonexistent/strategies.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
