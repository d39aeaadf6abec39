//! agentrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network or storage
//! - Async runtimes
//!
//! Leaf types (`State`, `Decision`, `Evidence`) are aggregated by `Run`;
//! `Task`, `TaskResult` and `WorkerInfo` are the scheduling layer's vocabulary.

pub mod decision;
pub mod error;
pub mod event;
pub mod evidence;
pub mod ids;
pub mod run;
pub mod state;
pub mod status;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use decision::{AskHuman, CallTool, Decision, Fail, Finish, Transition};
pub use error::RunError;
pub use event::{RunEvent, RunEventType};
pub use evidence::{Evidence, EvidenceType};
pub use ids::{EventId, RunId, TaskId, WorkerId};
pub use run::{PendingQuestion, Run};
pub use state::State;
pub use status::{RunStatus, TaskResultStatus, WorkerStatus};
pub use task::{Lease, Task, TaskResult};
pub use worker::{Heartbeat, WorkerInfo};
