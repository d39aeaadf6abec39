//! Worker configuration.

use std::time::Duration;

use agentrun_core::WorkerId;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker ID.
    pub worker_id: WorkerId,

    /// Address reported to the coordinator.
    pub address: String,

    /// Number of parallel task-processing loops.
    pub concurrency: usize,

    /// Heartbeat interval.
    pub heartbeat_interval: Duration,

    /// Delay before retrying after a queue-level dequeue error.
    pub dequeue_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::generate(),
            address: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            concurrency: 4,
            heartbeat_interval: Duration::from_secs(15),
            dequeue_backoff: Duration::from_secs(1),
        }
    }
}
