//! agentrun Worker Library
//!
//! The worker pulls tasks from a `TaskQueue`, drives each run through an
//! `ExecutionEngine` and keeps the coordinator informed with heartbeats.
//! `AgentEngine` is the planner-driven engine; planners, capabilities,
//! human responders and event stores plug in through traits.

pub mod capability;
pub mod config;
pub mod event_store;
pub mod executor;
pub mod human;
pub mod planner;
pub mod worker;

pub use capability::{Capability, CapabilityError, CapabilityRegistry, EchoCapability};
pub use config::Config;
pub use event_store::{EventStore, EventStoreError, MemoryEventStore};
pub use executor::{AgentEngine, EngineError, ExecutionEngine, ExecutionOutcome};
pub use human::{HumanInput, HumanInputError};
pub use planner::{BudgetStatus, PhasePlanner, PlanRequest, Planner, PlannerError, ScriptedPlanner};
pub use worker::{Worker, WorkerError};
