pub mod manager;
pub mod planner;

pub use manager::{ClosedPosition, ExitDecision, PositionManager, PositionState};
pub use planner::TradePlanner;
