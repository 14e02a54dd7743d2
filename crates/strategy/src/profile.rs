//! Stop-loss / take-profit mappings, one named profile per bot variant.

use serde::{Deserialize, Serialize};

use common::OrderSide;

use crate::levels::{FibDirection, LevelKey};

/// Where the levels a profile reads come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    /// Fibonacci over the highest high / lowest low of the fetched series.
    SeriesRange,
    /// Fibonacci over the swing (or breakout range) the detector attached.
    Swing,
    /// Classic pivots of the bar before the evaluated one.
    PriorBarPivots,
    /// Rules need no levels.
    None,
}

impl LevelSource {
    /// Fibonacci anchor for a trade: BUY measures low → high, SELL high → low.
    pub fn anchor(side: OrderSide) -> FibDirection {
        match side {
            OrderSide::Buy => FibDirection::Up,
            OrderSide::Sell => FibDirection::Down,
        }
    }
}

/// How one stop-loss or take-profit price is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelRule {
    /// A named level plus a signed price offset.
    Level {
        key: LevelKey,
        #[serde(default)]
        offset: f64,
    },
    /// `n` price steps from entry.
    Points(f64),
    /// Fixed price distance from entry.
    Distance(f64),
    /// Percentage of the entry price.
    Percent(f64),
    /// The named level, but never closer to entry than `percent` of entry.
    AtLeast { key: LevelKey, percent: f64 },
}

impl LevelRule {
    pub fn level(key: f64) -> Self {
        LevelRule::Level {
            key: LevelKey::fib(key),
            offset: 0.0,
        }
    }

    pub fn pivot(key: LevelKey, offset: f64) -> Self {
        LevelRule::Level { key, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideRules {
    pub stop_loss: LevelRule,
    pub take_profit: LevelRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub source: LevelSource,
    pub buy: SideRules,
    pub sell: SideRules,
}

impl ProfileMapping {
    pub fn rules(&self, side: OrderSide) -> &SideRules {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    /// Same Fibonacci keys on both sides; the side-dependent anchor mirrors them.
    fn mirrored(source: LevelSource, stop_loss: LevelRule, take_profit: LevelRule) -> Self {
        let rules = SideRules {
            stop_loss,
            take_profit,
        };
        Self {
            source,
            buy: rules,
            sell: rules,
        }
    }
}

/// Named SL/TP mapping selected per strategy in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyProfile {
    #[default]
    BosBreakout,
    FibZone,
    FibSniper,
    FibBackup,
    StructureBreakExtension,
    StructureBreakRange,
    StructureBreakPullback,
    PivotTrend,
    EmaCross,
    Custom(ProfileMapping),
}

impl StrategyProfile {
    pub fn mapping(&self) -> ProfileMapping {
        use LevelRule as R;
        use LevelSource as S;

        match *self {
            StrategyProfile::BosBreakout => {
                ProfileMapping::mirrored(S::SeriesRange, R::level(1.0), R::level(-1.0))
            }
            // Entry triggers sit at the swing's 0.618 retracement; stops go past them.
            StrategyProfile::FibZone => {
                ProfileMapping::mirrored(S::Swing, R::level(0.786), R::level(1.618))
            }
            StrategyProfile::FibSniper => ProfileMapping::mirrored(
                S::SeriesRange,
                R::AtLeast {
                    key: LevelKey::fib(0.618),
                    percent: 0.1,
                },
                R::Points(200.0),
            ),
            StrategyProfile::FibBackup => {
                ProfileMapping::mirrored(S::Swing, R::level(0.786), R::level(0.0))
            }
            StrategyProfile::StructureBreakExtension => {
                ProfileMapping::mirrored(S::Swing, R::level(1.0), R::level(1.618))
            }
            StrategyProfile::StructureBreakRange => {
                ProfileMapping::mirrored(S::Swing, R::level(1.0), R::level(0.0))
            }
            StrategyProfile::StructureBreakPullback => {
                ProfileMapping::mirrored(S::Swing, R::level(1.0), R::level(-1.0))
            }
            StrategyProfile::PivotTrend => ProfileMapping {
                source: S::PriorBarPivots,
                buy: SideRules {
                    stop_loss: R::pivot(LevelKey::S1, -0.001),
                    take_profit: R::pivot(LevelKey::R1, 0.0),
                },
                sell: SideRules {
                    stop_loss: R::pivot(LevelKey::R1, 0.001),
                    take_profit: R::pivot(LevelKey::S1, 0.0),
                },
            },
            StrategyProfile::EmaCross => {
                ProfileMapping::mirrored(S::None, R::Percent(20.0), R::Distance(1.0))
            }
            StrategyProfile::Custom(mapping) => mapping,
        }
    }
}
