use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::Config;
use engine::{log_events, ExecutionLoop, LoopSettings};
use paper::{PaperBroker, ReplayFeed};
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment configuration")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading strategies from {}", cfg.strategy_config_path))?;
    let registry = StrategyRegistry::from_config(&strategy_file).context("building strategy registry")?;
    if registry.is_empty() {
        bail!("{} configures no strategies", cfg.strategy_config_path);
    }
    info!(strategies = registry.strategies().len(), "SniperBot starting");

    // ── Paper broker + replay feed ────────────────────────────────────────────
    let broker = Arc::new(PaperBroker::new(cfg.paper_slippage_bps));
    let mut feed = ReplayFeed::load(&cfg.paper_feed_path)
        .with_context(|| format!("loading replay feed from {}", cfg.paper_feed_path))?;
    feed.install(&broker).await;
    for instrument in registry.instruments() {
        if !feed.instruments().any(|i| i == instrument) {
            warn!(pair = %instrument, "Configured instrument missing from replay feed");
        }
    }
    let warmed = feed.warm_up(&broker, cfg.paper_warmup_bars).await?;
    info!(bars = warmed, remaining = feed.remaining(), "Replay warm-up done");

    // ── Execution loop ────────────────────────────────────────────────────────
    let (exec, event_rx) = ExecutionLoop::new(
        registry,
        broker.clone(),
        broker.clone(),
        LoopSettings::from_config(&cfg),
    );
    tokio::spawn(log_events(event_rx));
    let (mut loop_task, handle) = engine::spawn(exec);

    // ── Replay advancer: one bar per poll interval ────────────────────────────
    let advancer = {
        let broker = broker.clone();
        let handle = handle.clone();
        let every = cfg.poll_interval;
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match feed.advance(&broker).await {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("Replay feed exhausted");
                        // let the loop see the final bar before stopping
                        ticker.tick().await;
                        handle.stop();
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Replay feed failed");
                        handle.stop();
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("Shutdown signal received");
            handle.stop();
            (&mut loop_task).await.context("execution loop panicked")?;
        }
        joined = &mut loop_task => {
            joined.context("execution loop panicked")?;
        }
    }
    advancer.abort();

    let trades = broker.closed_trades().await;
    let realised: f64 = trades.iter().map(|t| t.profit).sum();
    info!(closed = trades.len(), realised, "SniperBot stopped");
    Ok(())
}
