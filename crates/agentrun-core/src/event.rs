//! Run events persisted for audit and replay.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::{EventId, RunId};
use crate::{Decision, Evidence, State};

/// A persisted record of something that happened to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Per-run sequence number, assigned by the event store on append. Zero until then.
    #[serde(default)]
    pub seq: u64,
    /// Type of event.
    pub event_type: RunEventType,
    /// Unix timestamp (milliseconds) when the event occurred.
    pub timestamp_ms: i64,
    /// Event-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl RunEvent {
    pub fn new(run_id: RunId, event_type: RunEventType, payload: Value) -> Self {
        Self {
            id: EventId::generate(),
            run_id,
            seq: 0,
            event_type,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }

    pub fn run_started(run_id: RunId, goal: &str) -> Self {
        Self::new(run_id, RunEventType::RunStarted, json!({ "goal": goal }))
    }

    pub fn state_changed(run_id: RunId, from: State, to: State, reason: &str) -> Self {
        Self::new(
            run_id,
            RunEventType::StateChanged,
            json!({ "from": from, "to": to, "reason": reason }),
        )
    }

    pub fn decision_made(run_id: RunId, decision: &Decision) -> Self {
        let payload = serde_json::to_value(decision).unwrap_or(Value::Null);
        Self::new(run_id, RunEventType::DecisionMade, payload)
    }

    pub fn evidence_added(run_id: RunId, evidence: &Evidence) -> Self {
        let payload = serde_json::to_value(evidence).unwrap_or(Value::Null);
        Self::new(run_id, RunEventType::EvidenceAdded, payload)
    }

    pub fn run_paused(run_id: RunId, question: &str) -> Self {
        Self::new(run_id, RunEventType::RunPaused, json!({ "question": question }))
    }

    pub fn run_resumed(run_id: RunId) -> Self {
        Self::new(run_id, RunEventType::RunResumed, Value::Null)
    }

    pub fn run_completed(run_id: RunId, summary: &str, duration_ms: u64) -> Self {
        Self::new(
            run_id,
            RunEventType::RunCompleted,
            json!({ "summary": summary, "duration_ms": duration_ms }),
        )
    }

    pub fn run_failed(run_id: RunId, error: &str) -> Self {
        Self::new(run_id, RunEventType::RunFailed, json!({ "error": error }))
    }
}

/// Type of run event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    RunStarted,
    StateChanged,
    DecisionMade,
    EvidenceAdded,
    RunPaused,
    RunResumed,
    RunCompleted,
    RunFailed,
}

impl RunEventType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted | Self::RunFailed)
    }
}
