use std::time::Duration;

use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Strategy config file path
    pub strategy_config_path: String,

    // Paper broker
    pub paper_feed_path: String,
    pub paper_slippage_bps: f64,
    /// Bars revealed from the replay feed before the first poll.
    pub paper_warmup_bars: usize,

    // Loop timing
    pub poll_interval: Duration,
    /// Upper bound on any single market-data or broker call.
    pub collaborator_timeout: Duration,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            paper_feed_path: required_env("PAPER_FEED_PATH")?,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 0.0)?,
            paper_warmup_bars: parsed_env("PAPER_WARMUP_BARS", 200)?,
            poll_interval: Duration::from_secs(parsed_env("POLL_INTERVAL_SECS", 2)?),
            collaborator_timeout: Duration::from_millis(parsed_env(
                "COLLABORATOR_TIMEOUT_MS",
                5_000,
            )?),
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{key} has invalid value '{raw}': {e}"))),
    }
}
