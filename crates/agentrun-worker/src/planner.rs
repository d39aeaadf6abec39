//! The planner contract: given a run's state and evidence, produce one Decision.
//!
//! Workers depend only on the `Planner` trait; each backing service (an LLM
//! provider, a rules engine) supplies its own implementation.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use agentrun_core::{Decision, Evidence, EvidenceType, Run, RunId, State};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner backend error: {0}")]
    Backend(String),

    #[error("Planner has no decision left for run {0}")]
    Exhausted(RunId),
}

/// How much of the step budget a run has consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub steps_used: u32,
    pub max_steps: u32,
}

impl BudgetStatus {
    pub fn remaining(&self) -> u32 {
        self.max_steps.saturating_sub(self.steps_used)
    }
}

/// Everything a planner sees when asked for the next step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub run_id: RunId,
    pub goal: String,
    pub current_state: State,
    pub evidence: Vec<Evidence>,
    pub allowed_capabilities: Vec<String>,
    pub vars: HashMap<String, Value>,
    pub budget_status: BudgetStatus,
}

impl PlanRequest {
    pub fn from_run(run: &Run, allowed_capabilities: Vec<String>, budget_status: BudgetStatus) -> Self {
        Self {
            run_id: run.id().clone(),
            goal: run.goal().to_string(),
            current_state: run.current_state(),
            evidence: run.evidence().to_vec(),
            allowed_capabilities,
            vars: run.vars().clone(),
            budget_status,
        }
    }

    fn latest_answer(&self) -> Option<&str> {
        self.evidence
            .iter()
            .rev()
            .find(|e| e.evidence_type() == EvidenceType::HumanInput)
            .and_then(|e| e.content().get("answer"))
            .and_then(Value::as_str)
    }

    fn latest_tool_result(&self) -> Option<&Evidence> {
        self.evidence
            .iter()
            .rev()
            .find(|e| e.evidence_type() == EvidenceType::ToolResult)
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<Decision, PlannerError>;
}

/// Replays a fixed list of decisions, one per call.
pub struct ScriptedPlanner {
    decisions: Mutex<VecDeque<Decision>>,
}

impl ScriptedPlanner {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<Decision, PlannerError> {
        self.decisions
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| PlannerError::Exhausted(request.run_id.clone()))
    }
}

/// Deterministic planner that walks every phase once.
///
/// intake -> explore -> decide -> act (calls the first allowed capability
/// with the goal) -> validate -> finish. Without capabilities it skips `act`.
/// With `with_confirmation` it asks a human before entering `act` and fails
/// the run on anything but "yes".
#[derive(Debug, Clone, Default)]
pub struct PhasePlanner {
    confirm_actions: bool,
}

impl PhasePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirmation(mut self) -> Self {
        self.confirm_actions = true;
        self
    }
}

const CONFIRM_OPTIONS: [&str; 2] = ["yes", "no"];

#[async_trait]
impl Planner for PhasePlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<Decision, PlannerError> {
        let acted = request.latest_tool_result().is_some();
        let wants_act = !acted && !request.allowed_capabilities.is_empty();

        let decision = match request.current_state {
            State::Intake => Decision::transition(State::Explore, "goal accepted"),
            State::Explore => Decision::transition(State::Decide, "nothing further to gather"),
            State::Decide if wants_act && self.confirm_actions => {
                match request.latest_answer() {
                    None => Decision::ask_human(
                        format!("Run {} for \"{}\"?", request.allowed_capabilities.join(", "), request.goal),
                        CONFIRM_OPTIONS.iter().map(|o| o.to_string()).collect(),
                    ),
                    Some("yes") => Decision::transition(State::Act, "confirmed by human"),
                    Some(_) => Decision::fail("action declined by human", None),
                }
            }
            State::Decide if wants_act => Decision::transition(State::Act, "capability available"),
            State::Decide => Decision::transition(State::Validate, "no action required"),
            State::Act if acted => Decision::transition(State::Validate, "action performed"),
            State::Act => match request.allowed_capabilities.first() {
                Some(name) => Decision::call_tool(
                    name.clone(),
                    json!({ "goal": request.goal }),
                    "perform goal",
                ),
                None => Decision::transition(State::Validate, "no capability to call"),
            },
            State::Validate => {
                let result = request
                    .latest_tool_result()
                    .map(|e| e.content().clone())
                    .unwrap_or_else(|| json!({ "goal": request.goal }));
                Decision::finish(format!("completed: {}", request.goal), result)
            }
            State::Done | State::Failed => {
                Decision::fail("planner consulted on a finished run", None)
            }
        };
        Ok(decision)
    }
}
