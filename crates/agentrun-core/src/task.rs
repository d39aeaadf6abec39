//! Task and TaskResult types.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RunId, TaskId, TaskResultStatus, WorkerId};

/// Serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// A queueable reference to one run awaiting execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub run_id: RunId,
    pub goal: String,

    /// Higher values are delivered first by queues that honor priority.
    #[serde(default)]
    pub priority: i32,

    pub created_at: DateTime<Utc>,

    /// Number of negative acknowledgements so far.
    #[serde(default)]
    pub attempts: u32,

    pub max_retry: u32,

    /// Upper bound for a single execution attempt.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Task {
    pub fn new(goal: impl Into<String>, max_retry: u32, timeout: Duration) -> Self {
        Self {
            id: TaskId::generate(),
            run_id: RunId::generate(),
            goal: goal.into(),
            priority: 0,
            created_at: Utc::now(),
            attempts: 0,
            max_retry,
            timeout,
            metadata: HashMap::new(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True once the task has been nacked more than `max_retry` times.
    pub fn retries_exhausted(&self) -> bool {
        self.attempts > self.max_retry
    }

    /// The lease identifying this delivery of the task.
    pub fn lease(&self) -> Lease {
        Lease {
            task_id: self.id.clone(),
            attempt: self.attempts,
        }
    }
}

/// One delivery of a task.
///
/// Every redelivery goes through a nack, which bumps `attempts`, so the pair
/// is unique per delivery. Queues refuse acks and nacks for a lease that is
/// no longer the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lease {
    pub task_id: TaskId,
    pub attempt: u32,
}

/// Outcome of one delivery of a Task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub status: TaskResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub worker_id: WorkerId,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn completed(task: &Task, worker_id: WorkerId, result: Value, duration: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            run_id: task.run_id.clone(),
            status: TaskResultStatus::Completed,
            result: Some(result),
            error: None,
            duration,
            worker_id,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        task: &Task,
        worker_id: WorkerId,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            run_id: task.run_id.clone(),
            status: TaskResultStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration,
            worker_id,
            timestamp: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskResultStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let task = Task::new("summarize inbox", 3, Duration::from_secs(30))
            .with_priority(5)
            .with_metadata("tenant", "acme");
        let value = serde_json::to_value(&task).unwrap();

        for field in [
            "id",
            "run_id",
            "goal",
            "priority",
            "created_at",
            "attempts",
            "max_retry",
            "timeout",
            "metadata",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["timeout"], 30_000);
        assert_eq!(value["metadata"]["tenant"], "acme");

        let decoded: Task = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn test_retries_exhausted() {
        let mut task = Task::new("g", 2, Duration::from_secs(1));
        task.attempts = 2;
        assert!(!task.retries_exhausted());
        task.attempts = 3;
        assert!(task.retries_exhausted());
    }

    #[test]
    fn test_lease_changes_with_attempts() {
        let mut task = Task::new("g", 2, Duration::from_secs(1));
        let first = task.lease();
        task.attempts += 1;
        assert_eq!(first.task_id, task.lease().task_id);
        assert_ne!(first, task.lease());
    }

    #[test]
    fn test_failed_result_carries_error() {
        let task = Task::new("g", 0, Duration::from_secs(1));
        let result = TaskResult::failed(&task, WorkerId::new("w1"), "boom", Duration::ZERO);
        assert!(result.is_failed());
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.run_id, task.run_id);
    }
}
