//! The Coordinator: task submission entry point and single source of truth
//! for which workers exist and what they are doing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentrun_core::{
    Heartbeat, Lease, Task, TaskId, TaskResult, TaskResultStatus, WorkerId, WorkerInfo,
    WorkerStatus,
};

use crate::config::Config;
use crate::queue::{NackOutcome, QueueError, TaskQueue};

/// Scheduling errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Coordinator is closed")]
    Closed,

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Worker {worker_id} is busy with {tasks} task(s)")]
    WorkerBusy { worker_id: WorkerId, tasks: usize },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Per-call overrides for `Coordinator::submit`.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    priority: Option<i32>,
    timeout: Option<Duration>,
    max_retry: Option<u32>,
    metadata: HashMap<String, String>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = Some(max_retry);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Latest result per task, bounded by evicting the oldest task first.
struct RetainedResults {
    by_task: HashMap<TaskId, TaskResult>,
    order: VecDeque<TaskId>,
    limit: usize,
}

impl RetainedResults {
    fn new(limit: usize) -> Self {
        Self {
            by_task: HashMap::new(),
            order: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    fn insert(&mut self, result: TaskResult) {
        let task_id = result.task_id.clone();
        if self.by_task.insert(task_id.clone(), result).is_some() {
            return;
        }
        self.order.push_back(task_id);
        while self.order.len() > self.limit {
            if let Some(evicted) = self.order.pop_front() {
                self.by_task.remove(&evicted);
            }
        }
    }
}

/// Worker registry, task submission and result sink.
pub struct Coordinator {
    config: Config,
    queue: Arc<dyn TaskQueue>,

    /// Registered workers indexed by WorkerId.
    workers: RwLock<HashMap<WorkerId, WorkerInfo>>,

    /// Latest result per task, up to `result_retention` tasks.
    results: RwLock<RetainedResults>,

    results_tx: broadcast::Sender<TaskResult>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(config: Config, queue: Arc<dyn TaskQueue>) -> Self {
        let (results_tx, _) = broadcast::channel(config.result_buffer.max(1));
        let results = RwLock::new(RetainedResults::new(config.result_retention));
        Self {
            config,
            queue,
            workers: RwLock::new(HashMap::new()),
            results,
            results_tx,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Token cancelled by `close()`; background loops stop on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Build a task for `goal` and enqueue it.
    pub async fn submit(
        &self,
        goal: impl Into<String>,
        options: SubmitOptions,
    ) -> Result<Task, CoordinatorError> {
        if self.is_closed() {
            return Err(CoordinatorError::Closed);
        }

        let mut task = Task::new(
            goal,
            options.max_retry.unwrap_or(self.config.default_max_retry),
            options.timeout.unwrap_or(self.config.default_timeout),
        );
        task.priority = options.priority.unwrap_or_default();
        task.metadata = options.metadata;

        self.queue.enqueue(task.clone()).await?;

        info!(
            task_id = %task.id,
            run_id = %task.run_id,
            priority = task.priority,
            max_retry = task.max_retry,
            timeout_ms = task.timeout.as_millis() as u64,
            "Task submitted"
        );
        Ok(task)
    }

    /// Add a worker to the registry, keeping its counters if it was known before.
    pub async fn register_worker(&self, worker_id: WorkerId, address: impl Into<String>) -> WorkerInfo {
        let address = address.into();
        let mut workers = self.workers.write().await;
        let info = workers
            .entry(worker_id.clone())
            .and_modify(|w| {
                w.address = address.clone();
                w.status = WorkerStatus::Idle;
                w.current_task = None;
                w.active_tasks.clear();
                w.last_heartbeat = Utc::now();
            })
            .or_insert_with(|| WorkerInfo::new(worker_id.clone(), address.clone()))
            .clone();

        info!(worker_id = %worker_id, address = %address, "Worker registered");
        info
    }

    /// Remove a worker. A worker still holding tasks is refused.
    pub async fn unregister_worker(&self, worker_id: &WorkerId) -> Result<WorkerInfo, CoordinatorError> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get(worker_id)
            .ok_or_else(|| CoordinatorError::WorkerNotFound(worker_id.clone()))?;

        let held = worker.held_tasks().len();
        if worker.status == WorkerStatus::Busy && held > 0 {
            return Err(CoordinatorError::WorkerBusy {
                worker_id: worker_id.clone(),
                tasks: held,
            });
        }

        let removed = workers.remove(worker_id);
        info!(worker_id = %worker_id, "Worker unregistered");
        removed.ok_or_else(|| CoordinatorError::WorkerNotFound(worker_id.clone()))
    }

    /// Record a heartbeat. Unknown workers are registered on the spot.
    pub async fn heartbeat(&self, heartbeat: Heartbeat) {
        let mut workers = self.workers.write().await;
        let worker = workers
            .entry(heartbeat.worker_id.clone())
            .or_insert_with(|| {
                info!(worker_id = %heartbeat.worker_id, "Heartbeat from unknown worker, registering");
                WorkerInfo::new(heartbeat.worker_id.clone(), String::new())
            });

        if worker.status == WorkerStatus::Dead {
            info!(worker_id = %heartbeat.worker_id, "Dead worker resumed heartbeating");
        }
        worker.apply(&heartbeat);

        debug!(
            worker_id = %heartbeat.worker_id,
            status = %heartbeat.status,
            active_tasks = heartbeat.active_tasks.len(),
            "Heartbeat received"
        );
    }

    /// Snapshot of the registry, ordered by worker id.
    pub async fn list_workers(&self) -> Vec<WorkerInfo> {
        let workers = self.workers.read().await;
        let mut list: Vec<WorkerInfo> = workers.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn get_worker(&self, worker_id: &WorkerId) -> Result<WorkerInfo, CoordinatorError> {
        self.workers
            .read()
            .await
            .get(worker_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::WorkerNotFound(worker_id.clone()))
    }

    /// Record the outcome of a delivery and publish it to result subscribers.
    pub async fn report_result(&self, result: TaskResult) {
        {
            let mut workers = self.workers.write().await;
            if let Some(worker) = workers.get_mut(&result.worker_id) {
                match result.status {
                    TaskResultStatus::Completed => worker.tasks_complete += 1,
                    TaskResultStatus::Failed => worker.tasks_failed += 1,
                }
            }
        }

        info!(
            task_id = %result.task_id,
            run_id = %result.run_id,
            worker_id = %result.worker_id,
            status = ?result.status,
            error = ?result.error,
            duration_ms = result.duration.as_millis() as u64,
            "Task result reported"
        );

        self.results.write().await.insert(result.clone());

        // No subscribers is fine; the result is still stored.
        let _ = self.results_tx.send(result);
    }

    pub async fn task_result(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.results.read().await.by_task.get(task_id).cloned()
    }

    pub async fn results(&self) -> Vec<TaskResult> {
        self.results.read().await.by_task.values().cloned().collect()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<TaskResult> {
        self.results_tx.subscribe()
    }

    /// Mark workers whose last heartbeat is older than `worker_timeout` as dead
    /// and nack every delivery they reported a lease for. A task redelivered
    /// elsewhere in the meantime is left to its new holder.
    pub async fn reap_dead_workers(&self) -> Vec<WorkerId> {
        self.reap_dead_workers_at(Utc::now()).await
    }

    pub async fn reap_dead_workers_at(&self, now: DateTime<Utc>) -> Vec<WorkerId> {
        let mut lost: Vec<(WorkerId, Vec<Lease>)> = Vec::new();
        {
            let mut workers = self.workers.write().await;
            for worker in workers.values_mut() {
                if !worker.status.is_alive() || !worker.is_stale(now, self.config.worker_timeout) {
                    continue;
                }

                let held = worker.held_leases();
                warn!(
                    worker_id = %worker.id,
                    last_heartbeat = %worker.last_heartbeat,
                    held_tasks = held.len(),
                    "Worker missed heartbeat deadline, marking dead"
                );
                worker.status = WorkerStatus::Dead;
                worker.current_task = None;
                worker.active_tasks.clear();
                lost.push((worker.id.clone(), held));
            }
        }

        let mut reaped = Vec::with_capacity(lost.len());
        for (worker_id, leases) in lost {
            for lease in leases {
                let reason = format!("worker {} lost", worker_id);
                self.redeliver(&lease, &reason, &worker_id).await;
            }
            reaped.push(worker_id);
        }
        reaped
    }

    /// Nack queue deliveries that outlived their task timeout plus `lease_grace`.
    pub async fn reclaim_expired_leases(&self) -> Result<usize, CoordinatorError> {
        let reclaimed = self.queue.reclaim_expired(self.config.lease_grace).await?;
        let count = reclaimed.len();
        for (task_id, outcome) in reclaimed {
            if let NackOutcome::DeadLettered(letter) = outcome {
                // Attribute to the worker still claiming the task, if any.
                let holder = self
                    .holder_of(&task_id)
                    .await
                    .unwrap_or_else(|| WorkerId::new(""));
                let result = TaskResult::failed(
                    &letter.task,
                    holder,
                    format!("retry budget exhausted: {}", letter.reason),
                    Duration::ZERO,
                );
                self.report_result(result).await;
            } else {
                debug!(task_id = %task_id, "Expired lease reclaimed");
            }
        }
        Ok(count)
    }

    async fn holder_of(&self, task_id: &TaskId) -> Option<WorkerId> {
        self.workers
            .read()
            .await
            .values()
            .find(|w| w.held_tasks().contains(task_id))
            .map(|w| w.id.clone())
    }

    async fn redeliver(&self, lease: &Lease, reason: &str, worker_id: &WorkerId) {
        let task_id = &lease.task_id;
        match self.queue.nack(lease, reason).await {
            Ok(NackOutcome::Requeued { attempts }) => {
                info!(task_id = %task_id, attempts, "Task from lost worker requeued");
            }
            Ok(NackOutcome::DeadLettered(letter)) => {
                let result = TaskResult::failed(
                    &letter.task,
                    worker_id.clone(),
                    format!("retry budget exhausted: {}", reason),
                    Duration::ZERO,
                );
                self.report_result(result).await;
            }
            Err(QueueError::TaskNotFound(_)) => {
                // Settled before the worker went silent, or redelivered since.
                debug!(task_id = %task_id, attempt = lease.attempt, "Lease from lost worker no longer current");
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to redeliver task from lost worker");
            }
        }
    }

    /// Stop accepting submissions and stop background loops. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shutdown.cancel();
            info!("Coordinator closed");
        }
    }
}

/// Run the liveness reaper every `reap_interval` until the coordinator closes.
pub fn spawn_reaper(coordinator: Arc<Coordinator>) -> tokio::task::JoinHandle<()> {
    let shutdown = coordinator.shutdown_token();
    let period = coordinator.config().reap_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reaped = coordinator.reap_dead_workers().await;
            if !reaped.is_empty() {
                info!(count = reaped.len(), "Reaped dead workers");
            }
            if let Err(e) = coordinator.reclaim_expired_leases().await {
                warn!(error = %e, "Failed to reclaim expired leases");
            }
        }
        info!("Liveness reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryTaskQueue;

    fn coordinator(config: Config) -> Coordinator {
        let queue = Arc::new(MemoryTaskQueue::new(config.queue_capacity));
        Coordinator::new(config, queue)
    }

    #[tokio::test]
    async fn test_submit_applies_defaults_and_overrides() {
        let coord = coordinator(Config::default());

        let task = coord.submit("default", SubmitOptions::new()).await.unwrap();
        assert_eq!(task.max_retry, 3);
        assert_eq!(task.timeout, Duration::from_secs(300));
        assert_eq!(task.priority, 0);

        let task = coord
            .submit(
                "custom",
                SubmitOptions::new()
                    .with_priority(7)
                    .with_timeout(Duration::from_secs(5))
                    .with_max_retry(1)
                    .with_metadata("tenant", "acme"),
            )
            .await
            .unwrap();
        assert_eq!(task.priority, 7);
        assert_eq!(task.timeout, Duration::from_secs(5));
        assert_eq!(task.max_retry, 1);
        assert_eq!(task.metadata.get("tenant").map(String::as_str), Some("acme"));

        assert_eq!(coord.queue().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let coord = coordinator(Config::default());
        coord.close();
        coord.close();
        assert!(coord.is_closed());
        assert!(matches!(
            coord.submit("late", SubmitOptions::new()).await,
            Err(CoordinatorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_submit_surfaces_queue_full() {
        let coord = coordinator(Config {
            queue_capacity: 1,
            ..Config::default()
        });
        coord.submit("one", SubmitOptions::new()).await.unwrap();
        assert!(matches!(
            coord.submit("two", SubmitOptions::new()).await,
            Err(CoordinatorError::Queue(QueueError::Full { .. }))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_registers_unknown_worker() {
        let coord = coordinator(Config::default());
        coord
            .heartbeat(Heartbeat::new("unknown-worker", WorkerStatus::Idle).with_current_task(None))
            .await;

        let workers = coord.list_workers().await;
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].id.as_str(), "unknown-worker");
        assert_eq!(workers[0].status, WorkerStatus::Idle);

        coord
            .heartbeat(Heartbeat::new("unknown-worker", WorkerStatus::Busy))
            .await;
        assert_eq!(coord.list_workers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let coord = coordinator(Config::default());
        let id = WorkerId::new("w1");
        coord.register_worker(id.clone(), "10.0.0.1").await;
        assert_eq!(coord.get_worker(&id).await.unwrap().address, "10.0.0.1");

        coord
            .heartbeat(
                Heartbeat::new(id.clone(), WorkerStatus::Busy)
                    .with_active_tasks(vec![Lease {
                        task_id: TaskId::new("t1"),
                        attempt: 0,
                    }]),
            )
            .await;
        assert!(matches!(
            coord.unregister_worker(&id).await,
            Err(CoordinatorError::WorkerBusy { tasks: 1, .. })
        ));

        coord.heartbeat(Heartbeat::new(id.clone(), WorkerStatus::Idle)).await;
        coord.unregister_worker(&id).await.unwrap();
        assert!(matches!(
            coord.unregister_worker(&id).await,
            Err(CoordinatorError::WorkerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reaper_marks_dead_and_redelivers() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();

        let task = coord.submit("held", SubmitOptions::new()).await.unwrap();
        let delivered = coord.queue().dequeue(&cancel).await.unwrap();
        assert_eq!(delivered.id, task.id);

        let id = WorkerId::new("w1");
        coord
            .heartbeat(
                Heartbeat::new(id.clone(), WorkerStatus::Busy)
                    .with_active_tasks(vec![delivered.lease()]),
            )
            .await;

        // Fresh heartbeat: nothing to reap.
        assert!(coord.reap_dead_workers().await.is_empty());

        let later = Utc::now() + chrono::Duration::seconds(60);
        let reaped = coord.reap_dead_workers_at(later).await;
        assert_eq!(reaped, vec![id.clone()]);

        let worker = coord.get_worker(&id).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Dead);
        assert!(worker.current_task.is_none());

        let redelivered = coord.queue().dequeue(&cancel).await.unwrap();
        assert_eq!(redelivered.id, task.id);
        assert_eq!(redelivered.attempts, 1);

        // Already dead: not reaped twice.
        assert!(coord.reap_dead_workers_at(later).await.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_dead_letters_exhausted_task() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();
        let mut results = coord.subscribe_results();

        let task = coord
            .submit("fragile", SubmitOptions::new().with_max_retry(0))
            .await
            .unwrap();
        let delivered = coord.queue().dequeue(&cancel).await.unwrap();

        let id = WorkerId::new("w1");
        coord
            .heartbeat(
                Heartbeat::new(id.clone(), WorkerStatus::Busy)
                    .with_active_tasks(vec![delivered.lease()]),
            )
            .await;
        coord
            .reap_dead_workers_at(Utc::now() + chrono::Duration::seconds(60))
            .await;

        let result = results.recv().await.unwrap();
        assert_eq!(result.task_id, task.id);
        assert!(result.is_failed());
        assert!(result.error.unwrap().contains("worker w1 lost"));
        assert_eq!(coord.queue().dead_letters().await.unwrap().len(), 1);
        assert_eq!(coord.get_worker(&id).await.unwrap().tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_reaping_stale_holder_keeps_current_delivery() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();
        let later = Utc::now() + chrono::Duration::seconds(60);

        coord.submit("contested", SubmitOptions::new()).await.unwrap();
        let first = coord.queue().dequeue(&cancel).await.unwrap();
        let w1 = WorkerId::new("w1");
        coord
            .heartbeat(Heartbeat::new(w1.clone(), WorkerStatus::Busy).with_active_tasks(vec![first.lease()]))
            .await;
        coord.reap_dead_workers_at(later).await;

        let second = coord.queue().dequeue(&cancel).await.unwrap();
        assert_eq!(second.id, first.id);

        // w1 comes back still claiming its old delivery, then goes silent again.
        coord
            .heartbeat(Heartbeat::new(w1.clone(), WorkerStatus::Busy).with_active_tasks(vec![first.lease()]))
            .await;
        assert_eq!(coord.reap_dead_workers_at(later).await, vec![w1]);

        // The second delivery is untouched: not requeued, still settleable.
        assert_eq!(coord.queue().len().await.unwrap(), 0);
        coord.queue().acknowledge(&second.lease()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_worker_nack_after_redelivery_is_refused() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();

        coord.submit("contested", SubmitOptions::new()).await.unwrap();
        let first = coord.queue().dequeue(&cancel).await.unwrap();
        coord
            .heartbeat(Heartbeat::new("w1", WorkerStatus::Busy).with_active_tasks(vec![first.lease()]))
            .await;
        coord
            .reap_dead_workers_at(Utc::now() + chrono::Duration::seconds(60))
            .await;

        let second = coord.queue().dequeue(&cancel).await.unwrap();
        assert!(matches!(
            coord.queue().nack(&first.lease(), "w1 failed").await,
            Err(QueueError::TaskNotFound(_))
        ));
        assert_eq!(coord.queue().len().await.unwrap(), 0);

        coord.queue().acknowledge(&second.lease()).await.unwrap();
    }

    #[tokio::test]
    async fn test_reaper_ignores_task_without_lease() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();

        let task = coord.submit("held", SubmitOptions::new()).await.unwrap();
        coord.queue().dequeue(&cancel).await.unwrap();
        coord
            .heartbeat(Heartbeat::new("w1", WorkerStatus::Busy).with_current_task(Some(task.id.clone())))
            .await;
        coord
            .reap_dead_workers_at(Utc::now() + chrono::Duration::seconds(60))
            .await;

        // Left in flight for lease expiry to reclaim.
        assert_eq!(coord.queue().len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaimed_dead_letter_attributed_to_holder() {
        let coord = coordinator(Config::default());
        let cancel = CancellationToken::new();
        let mut results = coord.subscribe_results();

        coord
            .submit(
                "stuck",
                SubmitOptions::new()
                    .with_timeout(Duration::from_secs(1))
                    .with_max_retry(0),
            )
            .await
            .unwrap();
        let delivered = coord.queue().dequeue(&cancel).await.unwrap();
        coord
            .heartbeat(Heartbeat::new("w1", WorkerStatus::Busy).with_active_tasks(vec![delivered.lease()]))
            .await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(coord.reclaim_expired_leases().await.unwrap(), 1);

        let result = results.recv().await.unwrap();
        assert_eq!(result.worker_id.as_str(), "w1");
        assert!(result.error.unwrap().contains("lease expired"));
        assert_eq!(coord.get_worker(&WorkerId::new("w1")).await.unwrap().tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_results_are_bounded() {
        let coord = coordinator(Config {
            result_retention: 2,
            ..Config::default()
        });
        let tasks: Vec<Task> = (0..3)
            .map(|i| Task::new(format!("g{i}"), 0, Duration::from_secs(1)))
            .collect();
        for task in &tasks {
            coord
                .report_result(TaskResult::failed(task, WorkerId::new("w1"), "boom", Duration::ZERO))
                .await;
        }

        assert!(coord.task_result(&tasks[0].id).await.is_none());
        assert!(coord.task_result(&tasks[2].id).await.is_some());
        assert_eq!(coord.results().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dead_worker_revives_on_heartbeat() {
        let coord = coordinator(Config::default());
        let id = WorkerId::new("w1");
        coord.heartbeat(Heartbeat::new(id.clone(), WorkerStatus::Idle)).await;
        coord
            .reap_dead_workers_at(Utc::now() + chrono::Duration::seconds(60))
            .await;
        assert_eq!(coord.get_worker(&id).await.unwrap().status, WorkerStatus::Dead);

        coord.heartbeat(Heartbeat::new(id.clone(), WorkerStatus::Idle)).await;
        assert_eq!(coord.get_worker(&id).await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_report_result_updates_counters() {
        let coord = coordinator(Config::default());
        let id = WorkerId::new("w1");
        coord.register_worker(id.clone(), "").await;

        let task = Task::new("g", 0, Duration::from_secs(1));
        coord
            .report_result(TaskResult::completed(
                &task,
                id.clone(),
                serde_json::json!("ok"),
                Duration::from_millis(3),
            ))
            .await;

        assert_eq!(coord.get_worker(&id).await.unwrap().tasks_complete, 1);
        let stored = coord.task_result(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskResultStatus::Completed);
    }
}
