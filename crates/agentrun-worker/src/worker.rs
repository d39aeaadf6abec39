//! Worker lifecycle: registration, heartbeats and the task-processing loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agentrun_coordinator::{Coordinator, NackOutcome, QueueError, TaskQueue};
use agentrun_core::{Heartbeat, Lease, Task, TaskResult, WorkerId, WorkerStatus};

use crate::config::Config;
use crate::executor::ExecutionEngine;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker {0} already started")]
    AlreadyStarted(WorkerId),
}

/// Pulls tasks from the queue and executes them.
pub struct Worker {
    config: Arc<Config>,
    coordinator: Arc<Coordinator>,
    queue: Arc<dyn TaskQueue>,
    engine: Arc<dyn ExecutionEngine>,
    cancel: CancellationToken,
    active: Arc<Mutex<Vec<Lease>>>,
    started: AtomicBool,
}

impl Worker {
    pub fn new(
        config: Config,
        coordinator: Arc<Coordinator>,
        queue: Arc<dyn TaskQueue>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            coordinator,
            queue,
            engine,
            cancel: CancellationToken::new(),
            active: Arc::new(Mutex::new(Vec::new())),
            started: AtomicBool::new(false),
        }
    }

    /// Stop this worker whenever `parent` is cancelled.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.config.worker_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Deliveries currently being executed.
    pub async fn active_tasks(&self) -> Vec<Lease> {
        self.active.lock().await.clone()
    }

    /// Signal every loop to stop. `start` returns once they have.
    pub fn stop(&self) {
        info!(worker_id = %self.id(), "Stopping worker");
        self.cancel.cancel();
    }

    /// Register, run the processing and heartbeat loops until stopped, then
    /// deregister.
    pub async fn start(&self) -> Result<(), WorkerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted(self.id().clone()));
        }

        self.coordinator
            .register_worker(self.id().clone(), self.config.address.clone())
            .await;
        info!(
            worker_id = %self.id(),
            concurrency = self.config.concurrency,
            "Worker started"
        );

        let ctx = LoopContext {
            worker_id: self.id().clone(),
            config: self.config.clone(),
            coordinator: self.coordinator.clone(),
            queue: self.queue.clone(),
            engine: self.engine.clone(),
            cancel: self.cancel.clone(),
            active: self.active.clone(),
        };

        let heartbeat_handle = tokio::spawn(run_heartbeat_loop(ctx.clone()));

        let mut loops = JoinSet::new();
        for slot in 0..self.config.concurrency.max(1) {
            loops.spawn(run_processing_loop(ctx.clone(), slot));
        }
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(worker_id = %self.id(), error = %e, "Processing loop panicked");
            }
        }

        // All processing loops are gone; make sure the heartbeat loop follows.
        self.cancel.cancel();
        if let Err(e) = heartbeat_handle.await {
            error!(worker_id = %self.id(), error = %e, "Heartbeat loop panicked");
        }

        self.coordinator
            .heartbeat(Heartbeat::new(self.id().clone(), WorkerStatus::Idle))
            .await;
        if let Err(e) = self.coordinator.unregister_worker(self.id()).await {
            warn!(worker_id = %self.id(), error = %e, "Failed to unregister worker");
        }

        info!(worker_id = %self.id(), "Worker stopped");
        Ok(())
    }
}

/// State shared by the spawned loops of one worker.
#[derive(Clone)]
struct LoopContext {
    worker_id: WorkerId,
    config: Arc<Config>,
    coordinator: Arc<Coordinator>,
    queue: Arc<dyn TaskQueue>,
    engine: Arc<dyn ExecutionEngine>,
    cancel: CancellationToken,
    active: Arc<Mutex<Vec<Lease>>>,
}

async fn run_processing_loop(ctx: LoopContext, slot: usize) {
    debug!(worker_id = %ctx.worker_id, slot, "Processing loop started");

    loop {
        let task = match ctx.queue.dequeue(&ctx.cancel).await {
            Ok(task) => task,
            Err(QueueError::Cancelled) => break,
            Err(e) => {
                warn!(worker_id = %ctx.worker_id, error = %e, "Dequeue failed, backing off");
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ctx.config.dequeue_backoff) => continue,
                }
            }
        };

        ctx.process(task).await;
    }

    debug!(worker_id = %ctx.worker_id, slot, "Processing loop exited");
}

async fn run_heartbeat_loop(ctx: LoopContext) {
    let mut interval_timer = tokio::time::interval(ctx.config.heartbeat_interval);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = interval_timer.tick() => {}
        }

        let active = ctx.active.lock().await.clone();
        let status = if active.is_empty() {
            WorkerStatus::Idle
        } else {
            WorkerStatus::Busy
        };
        let heartbeat = Heartbeat::new(ctx.worker_id.clone(), status).with_active_tasks(active);
        ctx.coordinator.heartbeat(heartbeat).await;
    }
}

impl LoopContext {
    async fn process(&self, task: Task) {
        info!(
            worker_id = %self.worker_id,
            task_id = %task.id,
            run_id = %task.run_id,
            attempt = task.attempts + 1,
            "Executing task"
        );
        let lease = task.lease();
        self.active.lock().await.push(lease.clone());
        let started = Instant::now();

        let execution = tokio::time::timeout(
            task.timeout,
            self.engine.execute(&task.run_id, &task.goal, task.timeout),
        );
        let outcome = tokio::select! {
            res = execution => match res {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", task.timeout)),
            },
            _ = self.cancel.cancelled() => Err("worker stopped".to_string()),
        };

        match outcome {
            Ok(outcome) if outcome.is_success() => {
                if let Err(e) = self.queue.acknowledge(&lease).await {
                    warn!(task_id = %task.id, error = %e, "Acknowledge failed");
                }
                let result = TaskResult::completed(
                    &task,
                    self.worker_id.clone(),
                    outcome.result.unwrap_or(Value::Null),
                    outcome.duration,
                );
                self.coordinator.report_result(result).await;
            }
            Ok(outcome) => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| format!("run ended in {}", outcome.final_state));
                self.reject(&task, &lease, &reason, started).await;
            }
            Err(reason) => self.reject(&task, &lease, &reason, started).await,
        }

        self.active.lock().await.retain(|held| *held != lease);
    }

    /// Nack a failed delivery; a dead-lettered task gets a terminal result.
    async fn reject(&self, task: &Task, lease: &Lease, reason: &str, started: Instant) {
        match self.queue.nack(lease, reason).await {
            Ok(NackOutcome::Requeued { attempts }) => {
                debug!(worker_id = %self.worker_id, task_id = %task.id, attempts, "Delivery nacked for retry");
            }
            Ok(NackOutcome::DeadLettered(dead)) => {
                let error = format!(
                    "retry budget exhausted after {} attempts: {}",
                    dead.task.attempts, reason
                );
                let result =
                    TaskResult::failed(&dead.task, self.worker_id.clone(), error, started.elapsed());
                self.coordinator.report_result(result).await;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Nack failed");
            }
        }
    }
}
