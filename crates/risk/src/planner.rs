use tracing::debug;

use common::{Error, InstrumentMeta, OrderSide, PriceSeries, Result, Signal, Tick, TradePlan};
use strategy::levels::{fibonacci_levels, pivot_levels_for, LevelKey, LevelSet};
use strategy::profile::{LevelRule, LevelSource, ProfileMapping, StrategyProfile};

use crate::manager::PositionManager;

/// Relative tolerance for float noise when snapping to a price or lot grid.
const GRID_EPSILON: f64 = 1e-9;

fn grid_tolerance(units: f64) -> f64 {
    GRID_EPSILON * units.abs().max(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    StopLoss,
    TakeProfit,
}

impl Role {
    /// Whether this level belongs below the entry for a trade on `side`.
    fn below_entry(self, side: OrderSide) -> bool {
        matches!(
            (self, side),
            (Role::StopLoss, OrderSide::Buy) | (Role::TakeProfit, OrderSide::Sell)
        )
    }
}

/// Turns a signal into a bracketed order using one [`StrategyProfile`].
#[derive(Debug, Clone)]
pub struct TradePlanner {
    profile: StrategyProfile,
    mapping: ProfileMapping,
}

impl TradePlanner {
    pub fn new(profile: StrategyProfile) -> Self {
        Self {
            profile,
            mapping: profile.mapping(),
        }
    }

    pub fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    /// Builds the level set this profile reads for a trade on `side`.
    pub fn levels(&self, series: &PriceSeries, signal: &Signal, side: OrderSide) -> Result<LevelSet> {
        let anchor = LevelSource::anchor(side);
        match self.mapping.source {
            LevelSource::SeriesRange => {
                let (high, low) = series
                    .range()
                    .ok_or(Error::InsufficientData { have: 0, need: 1 })?;
                Ok(fibonacci_levels(high, low, anchor))
            }
            LevelSource::Swing => {
                let swing = signal.meta.swing.ok_or_else(|| {
                    Error::Config(format!("profile {:?} needs a signal swing", self.profile))
                })?;
                Ok(fibonacci_levels(swing.high, swing.low, anchor))
            }
            LevelSource::PriorBarPivots => pivot_levels_for(series, series.len().saturating_sub(1)),
            LevelSource::None => Ok(LevelSet::default()),
        }
    }

    /// Plans a market entry with stop-loss and take-profit.
    ///
    /// Fails with `PositionExists` before doing anything else when the
    /// instrument already has an open position.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        &self,
        positions: &PositionManager,
        instrument: &str,
        side: OrderSide,
        levels: &LevelSet,
        meta: &InstrumentMeta,
        tick: Tick,
        volume: f64,
    ) -> Result<TradePlan> {
        positions.ensure_flat(instrument)?;

        let entry = tick.entry_price(side);
        let rules = self.mapping.rules(side);
        let raw_sl = resolve(&rules.stop_loss, Role::StopLoss, side, entry, levels, meta)?;
        let raw_tp = resolve(&rules.take_profit, Role::TakeProfit, side, entry, levels, meta)?;

        self.finish(instrument, side, entry, raw_sl, raw_tp, volume, meta)
    }

    /// Equivalent plan for a re-entry: same side and volume, SL/TP at the
    /// same distances from the fresh entry price.
    pub fn replan(
        &self,
        positions: &PositionManager,
        previous: &TradePlan,
        meta: &InstrumentMeta,
        tick: Tick,
    ) -> Result<TradePlan> {
        positions.ensure_flat(&previous.instrument)?;

        let side = previous.side;
        let entry = tick.entry_price(side);
        let sl = offset(entry, previous.stop_distance(), Role::StopLoss.below_entry(side));
        let tp = offset(entry, previous.target_distance(), Role::TakeProfit.below_entry(side));

        self.finish(&previous.instrument, side, entry, sl, tp, previous.volume, meta)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        instrument: &str,
        side: OrderSide,
        entry: f64,
        raw_sl: f64,
        raw_tp: f64,
        volume: f64,
        meta: &InstrumentMeta,
    ) -> Result<TradePlan> {
        let stop_loss = snap_to_step(clamp_distance(raw_sl, Role::StopLoss, side, entry, meta), entry, meta);
        let take_profit =
            snap_to_step(clamp_distance(raw_tp, Role::TakeProfit, side, entry, meta), entry, meta);

        let volume = floor_to_lot(volume, meta.lot_step);
        if volume < meta.min_lot_size || volume <= 0.0 {
            return Err(Error::VolumeBelowMinimum {
                instrument: instrument.to_string(),
                volume,
                min_lot: meta.min_lot_size,
            });
        }

        let plan = TradePlan {
            instrument: instrument.to_string(),
            side,
            entry_price: entry,
            stop_loss,
            take_profit,
            volume,
        };
        if !plan.is_well_ordered() {
            return Err(Error::InsufficientDistance {
                instrument: instrument.to_string(),
                reason: format!(
                    "{side} entry {entry} with stop {stop_loss} and target {take_profit} is not bracketed"
                ),
            });
        }
        debug!(
            pair = %instrument,
            side = %side,
            entry,
            sl = stop_loss,
            tp = take_profit,
            volume,
            "Trade planned"
        );
        Ok(plan)
    }
}

fn offset(entry: f64, distance: f64, below: bool) -> f64 {
    if below {
        entry - distance
    } else {
        entry + distance
    }
}

fn resolve(
    rule: &LevelRule,
    role: Role,
    side: OrderSide,
    entry: f64,
    levels: &LevelSet,
    meta: &InstrumentMeta,
) -> Result<f64> {
    let below = role.below_entry(side);
    let named = |key: LevelKey| {
        levels
            .level(key)
            .ok_or_else(|| Error::Config(format!("level {key} is not in the level set")))
    };
    let price = match *rule {
        LevelRule::Level { key, offset: shift } => named(key)? + shift,
        LevelRule::Points(n) => offset(entry, n * meta.price_step, below),
        LevelRule::Distance(d) => offset(entry, d, below),
        LevelRule::Percent(p) => offset(entry, entry * p / 100.0, below),
        LevelRule::AtLeast { key, percent } => {
            let level = named(key)?;
            let floor = offset(entry, entry * percent / 100.0, below);
            if below {
                level.min(floor)
            } else {
                level.max(floor)
            }
        }
    };
    Ok(price)
}

/// Pushes a level closer than `min_stop_distance` out to exactly that distance
/// on the side it belongs to.
fn clamp_distance(level: f64, role: Role, side: OrderSide, entry: f64, meta: &InstrumentMeta) -> f64 {
    if (entry - level).abs() < meta.min_stop_distance {
        offset(entry, meta.min_stop_distance, role.below_entry(side))
    } else {
        level
    }
}

/// Rounds to the price grid, away from entry.
fn snap_to_step(level: f64, entry: f64, meta: &InstrumentMeta) -> f64 {
    let step = meta.price_step;
    if step <= 0.0 {
        return level;
    }
    let units = level / step;
    let snapped = if level < entry {
        (units + grid_tolerance(units)).floor()
    } else {
        (units - grid_tolerance(units)).ceil()
    };
    snapped * step
}

fn floor_to_lot(volume: f64, lot_step: f64) -> f64 {
    if lot_step <= 0.0 {
        return volume;
    }
    let units = volume / lot_step;
    (units + grid_tolerance(units)).floor() * lot_step
}

// ─── Tests ────────────────────────────────────────────────────────────────────
