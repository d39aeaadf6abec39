//! Worker registry entries and heartbeat payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Lease, TaskId, WorkerId, WorkerStatus};

/// What the coordinator knows about one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,

    /// Where the worker can be reached (hostname or socket address).
    #[serde(default)]
    pub address: String,

    pub status: WorkerStatus,

    /// The most recently started task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,

    /// Every delivery the worker holds; more than one when it runs several loops.
    #[serde(default)]
    pub active_tasks: Vec<Lease>,

    pub last_heartbeat: DateTime<Utc>,

    #[serde(default)]
    pub tasks_complete: u64,

    #[serde(default)]
    pub tasks_failed: u64,
}

impl WorkerInfo {
    pub fn new(id: WorkerId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            status: WorkerStatus::Idle,
            current_task: None,
            active_tasks: Vec::new(),
            last_heartbeat: Utc::now(),
            tasks_complete: 0,
            tasks_failed: 0,
        }
    }

    /// Apply a heartbeat: status, held tasks and timestamp.
    pub fn apply(&mut self, heartbeat: &Heartbeat) {
        self.status = heartbeat.status;
        self.current_task = heartbeat.current_task.clone();
        self.active_tasks = heartbeat.active_tasks.clone();
        self.last_heartbeat = Utc::now();
    }

    /// Every task this worker claims to hold, without duplicates.
    pub fn held_tasks(&self) -> Vec<TaskId> {
        let mut held: Vec<TaskId> = self.active_tasks.iter().map(|l| l.task_id.clone()).collect();
        if let Some(current) = &self.current_task {
            if !held.contains(current) {
                held.push(current.clone());
            }
        }
        held
    }

    /// Deliveries this worker reported with their lease. A bare `current_task`
    /// has no lease and is left to lease expiry.
    pub fn held_leases(&self) -> Vec<Lease> {
        self.active_tasks.clone()
    }

    /// True when the last heartbeat is older than `timeout` relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.last_heartbeat).to_std() {
            Ok(elapsed) => elapsed > timeout,
            Err(_) => false,
        }
    }
}

/// Periodic liveness signal from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
    #[serde(default)]
    pub active_tasks: Vec<Lease>,
}

impl Heartbeat {
    pub fn new(worker_id: impl Into<WorkerId>, status: WorkerStatus) -> Self {
        Self {
            worker_id: worker_id.into(),
            status,
            current_task: None,
            active_tasks: Vec::new(),
        }
    }

    /// Builder method to report a single held task.
    pub fn with_current_task(mut self, task_id: Option<TaskId>) -> Self {
        self.current_task = task_id.filter(|id| !id.is_empty());
        self
    }

    /// Builder method to report all held deliveries. The last one becomes `current_task`.
    pub fn with_active_tasks(mut self, leases: Vec<Lease>) -> Self {
        self.current_task = leases.last().map(|l| l.task_id.clone());
        self.active_tasks = leases;
        self
    }
}
