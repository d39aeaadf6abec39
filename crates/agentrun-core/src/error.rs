//! Run-state violations.
//!
//! These are local precondition failures: callers are expected to check the
//! run's status and state before issuing an operation, and none of them are
//! retried automatically.

use thiserror::Error;

use crate::{RunStatus, State};

/// Errors raised by operations on a single Run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// A string did not name one of the seven phases.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The requested edge is not part of the phase graph.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: State, to: State },

    /// The run already reached `completed` or `failed`.
    #[error("Run {run_id} already terminated with status {status}")]
    AlreadyTerminated { run_id: String, status: RunStatus },

    /// The run is still `pending`.
    #[error("Run {0} has not been started")]
    NotStarted(String),

    /// The run is `paused`.
    #[error("Run {0} is paused")]
    Paused(String),

    /// Human input arrived while no question was pending.
    #[error("Run {0} is not awaiting human input")]
    NoPendingQuestion(String),

    /// Human input was not one of the offered options.
    #[error("Invalid human input '{answer}', expected one of {options:?}")]
    InvalidHumanInput { answer: String, options: Vec<String> },
}
