//! agentrun Coordinator Library
//!
//! Task submission, the worker registry with liveness reaping, the TaskQueue
//! contract with an in-memory implementation, and the admin HTTP surface.

pub mod config;
pub mod coordinator;
pub mod http;
pub mod metrics;
pub mod queue;

pub use config::Config;
pub use coordinator::{spawn_reaper, Coordinator, CoordinatorError, SubmitOptions};
pub use queue::{DeadLetter, MemoryTaskQueue, NackOutcome, QueueError, TaskQueue};
