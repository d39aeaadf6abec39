//! In-memory TaskQueue.
//!
//! Delivers higher `priority` first and FIFO among equal priorities. Capacity
//! counts both waiting and in-flight tasks; dead letters do not count. At most
//! `dead_letter_limit` dead letters are kept, oldest evicted first.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentrun_core::{Lease, Task, TaskId};

use super::{DeadLetter, NackOutcome, QueueError, TaskQueue};

struct Waiting {
    seq: u64,
    task: Task,
}

impl PartialEq for Waiting {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Waiting {}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiting {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the older sequence number.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Delivery {
    task: Task,
    delivered_at: Instant,
}

/// Dead letters kept by default.
pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 1024;

#[derive(Default)]
struct Inner {
    waiting: BinaryHeap<Waiting>,
    in_flight: HashMap<TaskId, Delivery>,
    dead: VecDeque<DeadLetter>,
    dead_letter_limit: usize,
    next_seq: u64,
}

impl Inner {
    fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.push(Waiting { seq, task });
    }

    /// Take the delivery `lease` refers to. A lease from an earlier delivery
    /// of the same task is treated as unknown and the current delivery stays.
    fn take_delivery(&mut self, lease: &Lease) -> Result<Delivery, QueueError> {
        match self.in_flight.get(&lease.task_id) {
            Some(d) if d.task.attempts == lease.attempt => {}
            Some(d) => {
                debug!(
                    task_id = %lease.task_id,
                    stale_attempt = lease.attempt,
                    current_attempt = d.task.attempts,
                    "Rejecting stale lease"
                );
                return Err(QueueError::TaskNotFound(lease.task_id.clone()));
            }
            None => return Err(QueueError::TaskNotFound(lease.task_id.clone())),
        }
        self.in_flight
            .remove(&lease.task_id)
            .ok_or_else(|| QueueError::TaskNotFound(lease.task_id.clone()))
    }

    fn nack(&mut self, lease: &Lease, reason: &str) -> Result<NackOutcome, QueueError> {
        let Delivery { mut task, .. } = self.take_delivery(lease)?;

        task.attempts += 1;
        if task.retries_exhausted() {
            warn!(
                task_id = %task.id,
                attempts = task.attempts,
                max_retry = task.max_retry,
                reason = %reason,
                "Task dead-lettered"
            );
            let letter = DeadLetter {
                task,
                reason: reason.to_string(),
                dead_at: Utc::now(),
            };
            if self.dead.len() >= self.dead_letter_limit {
                if let Some(evicted) = self.dead.pop_front() {
                    debug!(task_id = %evicted.task.id, "Evicting oldest dead letter");
                }
            }
            if self.dead_letter_limit > 0 {
                self.dead.push_back(letter.clone());
            }
            return Ok(NackOutcome::DeadLettered(letter));
        }

        let attempts = task.attempts;
        info!(task_id = %task.id, attempts, reason = %reason, "Task requeued");
        self.push(task);
        Ok(NackOutcome::Requeued { attempts })
    }
}

/// Process-local queue backed by a priority heap.
pub struct MemoryTaskQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    available: Notify,
}

impl MemoryTaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_dead_letter_limit(capacity, DEFAULT_DEAD_LETTER_LIMIT)
    }

    pub fn with_dead_letter_limit(capacity: usize, dead_letter_limit: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                dead_letter_limit,
                ..Inner::default()
            }),
            available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of delivered tasks awaiting ack or nack.
    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    async fn try_take(&self) -> Option<Task> {
        let mut inner = self.inner.lock().await;
        let Waiting { task, .. } = inner.waiting.pop()?;
        inner.in_flight.insert(
            task.id.clone(),
            Delivery {
                task: task.clone(),
                delivered_at: Instant::now(),
            },
        );
        if !inner.waiting.is_empty() {
            // Pass the wakeup on so a second waiter is not stranded.
            self.available.notify_one();
        }
        Some(task)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if inner.waiting.len() + inner.in_flight.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        debug!(task_id = %task.id, priority = task.priority, "Task enqueued");
        inner.push(task);
        drop(inner);

        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Task, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_take().await {
                return Ok(task);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            }
        }
    }

    async fn acknowledge(&self, lease: &Lease) -> Result<(), QueueError> {
        self.inner.lock().await.take_delivery(lease)?;
        debug!(task_id = %lease.task_id, attempt = lease.attempt, "Task acknowledged");
        Ok(())
    }

    async fn nack(&self, lease: &Lease, reason: &str) -> Result<NackOutcome, QueueError> {
        let outcome = self.inner.lock().await.nack(lease, reason)?;
        if matches!(outcome, NackOutcome::Requeued { .. }) {
            self.available.notify_one();
        }
        Ok(outcome)
    }

    async fn peek(&self, limit: usize) -> Result<Vec<Task>, QueueError> {
        let inner = self.inner.lock().await;
        let mut waiting: Vec<&Waiting> = inner.waiting.iter().collect();
        waiting.sort_by(|a, b| b.cmp(a));
        Ok(waiting
            .into_iter()
            .take(limit)
            .map(|w| w.task.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().await.waiting.len())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        Ok(self.inner.lock().await.dead.iter().cloned().collect())
    }

    async fn reclaim_expired(
        &self,
        grace: Duration,
    ) -> Result<Vec<(TaskId, NackOutcome)>, QueueError> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<Lease> = inner
            .in_flight
            .values()
            .filter(|d| d.delivered_at.elapsed() > d.task.timeout + grace)
            .map(|d| d.task.lease())
            .collect();

        let mut reclaimed = Vec::with_capacity(expired.len());
        for lease in expired {
            let outcome = inner.nack(&lease, "lease expired")?;
            reclaimed.push((lease.task_id, outcome));
        }
        drop(inner);

        if reclaimed
            .iter()
            .any(|(_, o)| matches!(o, NackOutcome::Requeued { .. }))
        {
            self.available.notify_one();
        }
        Ok(reclaimed)
    }
}
