use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::executor::ExecutionLoop;

/// Cloneable handle used to stop a spawned [`ExecutionLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl LoopHandle {
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("ExecutionLoop already gone");
        }
    }
}

/// Spawns the loop on the runtime and returns its join handle plus a stop handle.
pub fn spawn(exec: ExecutionLoop) -> (JoinHandle<()>, LoopHandle) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(exec.run(shutdown_rx));
    info!("ExecutionLoop spawned");
    (task, LoopHandle { shutdown_tx })
}
