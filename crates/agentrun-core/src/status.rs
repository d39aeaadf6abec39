//! Status enums for Runs, Workers and Task results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a Run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started.
    #[default]
    Pending,
    /// Actively executing.
    Running,
    /// Suspended, typically waiting on a human answer.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl RunStatus {
    /// Returns true if the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness status of a Worker as seen by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Worker is alive and has no task in hand.
    #[default]
    Idle,
    /// Worker is executing at least one task.
    Busy,
    /// Worker missed its heartbeat deadline.
    Dead,
}

impl WorkerStatus {
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Dead)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded in a TaskResult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    /// The run reached `done`.
    Completed,
    /// The run failed and the task will not be redelivered.
    Failed,
}

impl From<RunStatus> for TaskResultStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => Self::Completed,
            _ => Self::Failed,
        }
    }
}
