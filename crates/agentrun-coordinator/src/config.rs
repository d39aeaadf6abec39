//! Coordinator configuration.

use std::time::Duration;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admin HTTP bind address.
    pub http_bind_addr: String,

    /// `max_retry` for tasks submitted without an override.
    pub default_max_retry: u32,

    /// Per-attempt timeout for tasks submitted without an override.
    pub default_timeout: Duration,

    /// Heartbeat age after which a worker is considered dead.
    pub worker_timeout: Duration,

    /// How often the liveness reaper runs.
    pub reap_interval: Duration,

    /// Slack added to a task's timeout before its queue lease is reclaimed.
    pub lease_grace: Duration,

    /// Capacity of the in-memory task queue.
    pub queue_capacity: usize,

    /// Dead letters kept by the in-memory queue; the oldest are evicted first.
    pub dead_letter_limit: usize,

    /// Buffer size of the task result broadcast channel.
    pub result_buffer: usize,

    /// Task results kept for `task_result` lookups; the oldest are evicted first.
    pub result_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:50052".to_string(),
            default_max_retry: 3,
            default_timeout: Duration::from_secs(300),
            worker_timeout: Duration::from_secs(45),
            reap_interval: Duration::from_secs(15),
            lease_grace: Duration::from_secs(30),
            queue_capacity: 1024,
            dead_letter_limit: 1024,
            result_buffer: 256,
            result_retention: 10_000,
        }
    }
}
