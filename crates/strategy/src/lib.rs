pub mod config;
pub mod detectors;
pub mod frame;
pub mod indicators;
pub mod levels;
pub mod profile;
pub mod registry;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use detectors::{Detector, SignalDetector};
pub use frame::{Column, IndicatorFrame};
pub use levels::{fibonacci_levels, pivot_levels, pivot_levels_for, FibDirection, LevelKey, LevelSet};
pub use profile::{LevelRule, LevelSource, ProfileMapping, SideRules, StrategyProfile};
pub use registry::{RegisteredStrategy, StrategyRegistry};
