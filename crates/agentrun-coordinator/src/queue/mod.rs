//! The TaskQueue contract.
//!
//! Delivery is at-least-once with a single current owner: a dequeued task is
//! invisible to other callers until it is acknowledged or nacked. Each
//! delivery is identified by its `Lease`, so a holder that was given up on
//! cannot settle a later delivery of the same task.

mod memory;

pub use memory::{MemoryTaskQueue, DEFAULT_DEAD_LETTER_LIMIT};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use agentrun_core::{Lease, Task, TaskId};

/// Queue-level errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The caller's cancellation signal fired while waiting.
    #[error("Dequeue cancelled")]
    Cancelled,

    /// Infrastructure failure in the backing store.
    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// What happened to a nacked task.
#[derive(Debug, Clone, PartialEq)]
pub enum NackOutcome {
    /// Offered again; `attempts` is the new attempt count.
    Requeued { attempts: u32 },
    /// Retry budget exhausted; the task will not be delivered again.
    DeadLettered(DeadLetter),
}

/// A task that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: Task,
    /// Reason given with the final nack.
    pub reason: String,
    pub dead_at: DateTime<Utc>,
}

/// Durable, at-least-once delivery of Tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist a task. Fails with `QueueError::Full` when the store is at capacity.
    async fn enqueue(&self, task: Task) -> Result<(), QueueError>;

    /// Wait for the next task, or return `QueueError::Cancelled` once `cancel` fires.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Task, QueueError>;

    /// Permanently remove a delivered task. Fails with `TaskNotFound` unless
    /// `lease` is the task's current delivery.
    async fn acknowledge(&self, lease: &Lease) -> Result<(), QueueError>;

    /// Return a delivered task for redelivery, incrementing its attempt count.
    /// Once `attempts > max_retry` the task is dead-lettered instead. A stale
    /// `lease` fails with `TaskNotFound` and leaves the current delivery alone.
    async fn nack(&self, lease: &Lease, reason: &str) -> Result<NackOutcome, QueueError>;

    /// Up to `limit` waiting tasks in delivery order.
    async fn peek(&self, limit: usize) -> Result<Vec<Task>, QueueError>;

    /// Number of tasks waiting for delivery.
    async fn len(&self) -> Result<usize, QueueError>;

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Tasks that exhausted their retry budget.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        Ok(Vec::new())
    }

    /// Nack deliveries held longer than their task timeout plus `grace`.
    async fn reclaim_expired(
        &self,
        _grace: Duration,
    ) -> Result<Vec<(TaskId, NackOutcome)>, QueueError> {
        Ok(Vec::new())
    }
}
