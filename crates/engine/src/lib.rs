pub mod executor;
pub mod lifecycle;

pub use executor::{log_events, ExecutionLoop, LoopSettings};
pub use lifecycle::{spawn, LoopHandle};
