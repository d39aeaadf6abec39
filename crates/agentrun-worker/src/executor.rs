//! Run execution.
//!
//! `AgentEngine` drives one `Run` from `intake` to a terminal phase by asking a
//! `Planner` for one `Decision` at a time and applying it. Transition legality
//! and the side-effect policy are enforced here; `Run` itself does not check them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use agentrun_core::{
    AskHuman, CallTool, Decision, Evidence, Fail, Finish, Run, RunError, RunEvent, RunId,
    RunStatus, State, Transition,
};

use crate::capability::CapabilityRegistry;
use crate::event_store::EventStore;
use crate::human::HumanInput;
use crate::planner::{BudgetStatus, PlanRequest, Planner};

/// Source recorded on evidence the engine writes itself.
const ENGINE_SOURCE: &str = "engine";

/// Errors that abort execution without producing an outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Engine backend error: {0}")]
    Backend(String),
}

/// What a finished run reports back to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration: Duration,
    pub final_state: State,
}

impl ExecutionOutcome {
    pub fn from_run(run: &Run) -> Self {
        Self {
            status: run.status(),
            result: run.result().cloned(),
            error: run.error().map(str::to_string),
            duration: run.duration(),
            final_state: run.current_state(),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            status: RunStatus::Failed,
            result: None,
            error: Some(format!("timed out after {:?}", timeout)),
            duration: timeout,
            final_state: State::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Executes the run behind a task.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(
        &self,
        run_id: &RunId,
        goal: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, EngineError>;
}

/// Planner-driven engine.
pub struct AgentEngine {
    planner: Arc<dyn Planner>,
    capabilities: CapabilityRegistry,
    human: Option<Arc<dyn HumanInput>>,
    events: Option<Arc<dyn EventStore>>,
    max_steps: u32,
}

impl AgentEngine {
    pub fn new(planner: Arc<dyn Planner>, capabilities: CapabilityRegistry) -> Self {
        Self {
            planner,
            capabilities,
            human: None,
            events: None,
            max_steps: 32,
        }
    }

    pub fn with_human_input(mut self, human: Arc<dyn HumanInput>) -> Self {
        self.human = Some(human);
        self
    }

    pub fn with_event_store(mut self, events: Arc<dyn EventStore>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Drive a fresh run for `goal` until it terminates and return it.
    pub async fn run_goal(&self, run_id: RunId, goal: &str) -> Result<Run, EngineError> {
        let mut run = Run::new(run_id, goal);
        run.start();
        info!(run_id = %run.id(), goal = %goal, "Run started");
        self.emit(vec![RunEvent::run_started(run.id().clone(), goal)])
            .await;

        let mut steps_used = 0;
        while !run.is_terminal() {
            if steps_used >= self.max_steps {
                let reason = format!("step budget exhausted after {} steps", steps_used);
                self.fail_run(&mut run, reason).await;
                break;
            }

            let allowed = self.capabilities.allowed_for(run.current_state());
            let request = PlanRequest::from_run(
                &run,
                allowed,
                BudgetStatus {
                    steps_used,
                    max_steps: self.max_steps,
                },
            );
            steps_used += 1;

            let decision = match self.planner.plan(&request).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.fail_run(&mut run, format!("planner error: {}", e))
                        .await;
                    break;
                }
            };

            debug!(run_id = %run.id(), state = %run.current_state(), decision = %decision, "Decision made");
            self.emit(vec![RunEvent::decision_made(run.id().clone(), &decision)])
                .await;
            self.apply(&mut run, decision).await?;
        }

        Ok(run)
    }

    async fn apply(&self, run: &mut Run, decision: Decision) -> Result<(), EngineError> {
        match decision {
            Decision::CallTool(call) => self.call_tool(run, call).await,
            Decision::Transition(transition) => self.transition(run, transition).await,
            Decision::AskHuman(ask) => return self.ask_human(run, ask).await,
            Decision::Finish(Finish { summary, result }) => {
                self.complete_run(run, &summary, result).await
            }
            Decision::Fail(Fail { reason, cause }) => {
                let error = match cause {
                    Some(cause) => format!("{}: {}", reason, cause),
                    None => reason,
                };
                self.fail_run(run, error).await
            }
        }
        Ok(())
    }

    async fn call_tool(&self, run: &mut Run, call: CallTool) {
        let state = run.current_state();
        let Some(capability) = self.capabilities.get(&call.name) else {
            let note = format!("rejected call to unknown capability {}", call.name);
            self.record(run, Evidence::system_note(ENGINE_SOURCE, note))
                .await;
            return;
        };

        if capability.side_effects() && !state.allows_side_effects() {
            warn!(run_id = %run.id(), capability = %call.name, state = %state, "Side-effecting call outside act rejected");
            let note = format!(
                "rejected call to {}: side effects are not allowed in {}",
                call.name, state
            );
            self.record(run, Evidence::system_note(ENGINE_SOURCE, note))
                .await;
            return;
        }

        let content = match capability.invoke(call.input).await {
            Ok(output) => output,
            Err(e) => {
                debug!(run_id = %run.id(), capability = %call.name, error = %e, "Capability failed");
                json!({ "error": e.to_string() })
            }
        };
        self.record(run, Evidence::tool_result(call.name, content))
            .await;
    }

    async fn transition(&self, run: &mut Run, transition: Transition) {
        let from = run.current_state();
        let to = transition.to_state;

        if !from.can_transition_to(to) {
            let note = format!("rejected transition {} -> {}: {}", from, to, transition.reason);
            self.record(run, Evidence::system_note(ENGINE_SOURCE, note))
                .await;
            return;
        }

        match to {
            State::Done => self.complete_run(run, &transition.reason, Value::Null).await,
            State::Failed => self.fail_run(run, transition.reason).await,
            _ => {
                run.transition_to(to);
                self.emit(vec![RunEvent::state_changed(
                    run.id().clone(),
                    from,
                    to,
                    &transition.reason,
                )])
                .await;
            }
        }
    }

    async fn ask_human(&self, run: &mut Run, ask: AskHuman) -> Result<(), EngineError> {
        run.await_human(ask.question.clone(), ask.options.clone())?;
        self.emit(vec![RunEvent::run_paused(run.id().clone(), &ask.question)])
            .await;

        let Some(human) = &self.human else {
            self.fail_run(run, format!("no human responder for: {}", ask.question))
                .await;
            return Ok(());
        };

        let answer = match human.ask(run.id(), &ask.question, &ask.options).await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail_run(run, e.to_string()).await;
                return Ok(());
            }
        };

        match run.provide_human_input(human.responder(), answer) {
            Ok(()) => {
                let mut events = Vec::with_capacity(2);
                if let Some(evidence) = run.evidence().last() {
                    events.push(RunEvent::evidence_added(run.id().clone(), evidence));
                }
                events.push(RunEvent::run_resumed(run.id().clone()));
                self.emit(events).await;
            }
            Err(e) => self.fail_run(run, e.to_string()).await,
        }
        Ok(())
    }

    async fn record(&self, run: &mut Run, evidence: Evidence) {
        let event = RunEvent::evidence_added(run.id().clone(), &evidence);
        run.add_evidence(evidence);
        self.emit(vec![event]).await;
    }

    async fn complete_run(&self, run: &mut Run, summary: &str, result: Value) {
        let from = run.current_state();
        run.complete(result);
        let duration_ms = run.duration().as_millis() as u64;
        info!(run_id = %run.id(), duration_ms, "Run completed");
        self.emit(vec![
            RunEvent::state_changed(run.id().clone(), from, State::Done, summary),
            RunEvent::run_completed(run.id().clone(), summary, duration_ms),
        ])
        .await;
    }

    async fn fail_run(&self, run: &mut Run, reason: impl Into<String>) {
        let reason = reason.into();
        let from = run.current_state();
        run.fail(reason.clone());
        warn!(run_id = %run.id(), error = %reason, "Run failed");
        self.emit(vec![
            RunEvent::state_changed(run.id().clone(), from, State::Failed, &reason),
            RunEvent::run_failed(run.id().clone(), &reason),
        ])
        .await;
    }

    /// Append to the event store. Store failures are logged and do not affect the run.
    async fn emit(&self, events: Vec<RunEvent>) {
        let Some(store) = &self.events else {
            return;
        };
        if let Err(e) = store.append(events).await {
            warn!(error = %e, "Failed to append run events");
        }
    }
}

#[async_trait]
impl ExecutionEngine for AgentEngine {
    async fn execute(
        &self,
        run_id: &RunId,
        goal: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, EngineError> {
        match tokio::time::timeout(timeout, self.run_goal(run_id.clone(), goal)).await {
            Ok(run) => Ok(ExecutionOutcome::from_run(&run?)),
            Err(_) => {
                warn!(run_id = %run_id, ?timeout, "Run timed out");
                self.emit(vec![RunEvent::run_failed(
                    run_id.clone(),
                    &format!("timed out after {:?}", timeout),
                )])
                .await;
                Ok(ExecutionOutcome::timed_out(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilityError, EchoCapability};
    use crate::event_store::MemoryEventStore;
    use crate::human::HumanInputError;
    use crate::planner::{PhasePlanner, PlannerError, ScriptedPlanner};
    use agentrun_core::{EvidenceType, RunEventType};

    struct Deploy;

    #[async_trait]
    impl Capability for Deploy {
        fn name(&self) -> &str {
            "deploy"
        }

        async fn invoke(&self, input: Value) -> Result<Value, CapabilityError> {
            match input.get("target") {
                Some(target) => Ok(json!({ "deployed": target })),
                None => Err(CapabilityError::InvalidInput("missing target".into())),
            }
        }
    }

    struct FixedAnswer(&'static str);

    #[async_trait]
    impl HumanInput for FixedAnswer {
        fn responder(&self) -> &str {
            "operator"
        }

        async fn ask(
            &self,
            _run_id: &RunId,
            _question: &str,
            _options: &[String],
        ) -> Result<String, HumanInputError> {
            Ok(self.0.to_string())
        }
    }

    struct Stalling;

    #[async_trait]
    impl Planner for Stalling {
        async fn plan(&self, _request: &PlanRequest) -> Result<Decision, PlannerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Decision::fail("unreachable", None))
        }
    }

    fn engine(decisions: Vec<Decision>) -> AgentEngine {
        let registry = CapabilityRegistry::new()
            .with(Arc::new(EchoCapability))
            .with(Arc::new(Deploy));
        AgentEngine::new(Arc::new(ScriptedPlanner::new(decisions)), registry)
    }

    #[tokio::test]
    async fn test_phase_planner_completes_with_tool_result() {
        let engine = AgentEngine::new(
            Arc::new(PhasePlanner::new()),
            CapabilityRegistry::new().with(Arc::new(EchoCapability)),
        );
        let run = engine.run_goal(RunId::new("r1"), "say hi").await.unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.current_state(), State::Done);
        assert_eq!(
            run.result().unwrap(),
            &json!({ "echo": { "goal": "say hi" } })
        );
        assert!(run.end_time().is_some());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_noted_and_run_continues() {
        let engine = engine(vec![
            Decision::transition(State::Act, "skip ahead"),
            Decision::transition(State::Decide, "ok"),
            Decision::finish("done", json!(1)),
        ]);
        let run = engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        let note = &run.evidence()[0];
        assert_eq!(note.evidence_type(), EvidenceType::SystemNote);
        assert!(note.content().as_str().unwrap().contains("intake -> act"));
    }

    #[tokio::test]
    async fn test_side_effects_rejected_outside_act() {
        let engine = engine(vec![
            Decision::transition(State::Explore, "look"),
            Decision::call_tool("deploy", json!({"target": "prod"}), "eager"),
            Decision::call_tool("echo", json!("ping"), "read"),
            Decision::transition(State::Decide, "decide"),
            Decision::transition(State::Act, "act"),
            Decision::call_tool("deploy", json!({"target": "prod"}), "now"),
            Decision::call_tool("deploy", json!({}), "broken"),
            Decision::finish("done", Value::Null),
        ]);
        let run = engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        let kinds: Vec<_> = run.evidence().iter().map(|e| e.evidence_type()).collect();
        assert_eq!(
            kinds,
            vec![
                EvidenceType::SystemNote,
                EvidenceType::ToolResult,
                EvidenceType::ToolResult,
                EvidenceType::ToolResult,
            ]
        );
        assert_eq!(run.evidence()[2].content(), &json!({ "deployed": "prod" }));
        assert!(run.evidence()[3].content().get("error").is_some());
    }

    #[tokio::test]
    async fn test_step_budget_exhaustion_fails_run() {
        let engine = engine(vec![Decision::transition(State::Explore, "loop"); 10])
            .with_max_steps(3);
        let run = engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().unwrap().contains("step budget exhausted"));
    }

    #[tokio::test]
    async fn test_planner_exhaustion_fails_run() {
        let run = engine(vec![]).run_goal(RunId::new("r1"), "g").await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().unwrap().starts_with("planner error"));
    }

    #[tokio::test]
    async fn test_fail_decision_carries_cause() {
        let run = engine(vec![Decision::fail("cannot proceed", Some("quota".into()))])
            .run_goal(RunId::new("r1"), "g")
            .await
            .unwrap();
        assert_eq!(run.error(), Some("cannot proceed: quota"));
        assert_eq!(run.current_state(), State::Failed);
    }

    #[tokio::test]
    async fn test_ask_human_without_responder_fails() {
        let run = engine(vec![Decision::ask_human("proceed?", vec![])])
            .run_goal(RunId::new("r1"), "g")
            .await
            .unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.pending_question().is_none());
    }

    #[tokio::test]
    async fn test_ask_human_answer_is_recorded() {
        let engine = engine(vec![
            Decision::ask_human("proceed?", vec!["yes".into(), "no".into()]),
            Decision::finish("done", Value::Null),
        ])
        .with_human_input(Arc::new(FixedAnswer("yes")));
        let run = engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        let answer = &run.evidence()[0];
        assert_eq!(answer.evidence_type(), EvidenceType::HumanInput);
        assert_eq!(answer.source(), "operator");
        assert_eq!(answer.content()["answer"], "yes");
    }

    #[tokio::test]
    async fn test_ask_human_invalid_answer_fails() {
        let engine = engine(vec![Decision::ask_human("proceed?", vec!["yes".into()])])
            .with_human_input(Arc::new(FixedAnswer("maybe")));
        let run = engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().unwrap().contains("maybe"));
    }

    #[tokio::test]
    async fn test_confirmed_action_runs_capability() {
        let engine = AgentEngine::new(
            Arc::new(PhasePlanner::new().with_confirmation()),
            CapabilityRegistry::new().with(Arc::new(EchoCapability)),
        )
        .with_human_input(Arc::new(FixedAnswer("yes")));
        let run = engine.run_goal(RunId::new("r1"), "say hi").await.unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.result().unwrap()["echo"]["goal"], "say hi");
        assert!(run
            .evidence()
            .iter()
            .any(|e| e.evidence_type() == EvidenceType::HumanInput));
    }

    #[tokio::test]
    async fn test_declined_action_fails_run() {
        let engine = AgentEngine::new(
            Arc::new(PhasePlanner::new().with_confirmation()),
            CapabilityRegistry::new().with(Arc::new(EchoCapability)),
        )
        .with_human_input(Arc::new(FixedAnswer("no")));
        let run = engine.run_goal(RunId::new("r1"), "say hi").await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().unwrap().contains("declined"));
        assert!(!run
            .evidence()
            .iter()
            .any(|e| e.evidence_type() == EvidenceType::ToolResult));
    }

    #[tokio::test]
    async fn test_events_are_appended_in_order() {
        let store = Arc::new(MemoryEventStore::default());
        let engine = AgentEngine::new(
            Arc::new(PhasePlanner::new()),
            CapabilityRegistry::new().with(Arc::new(EchoCapability)),
        )
        .with_event_store(store.clone());
        engine.run_goal(RunId::new("r1"), "g").await.unwrap();

        let events = store.load_events(&RunId::new("r1")).await.unwrap();
        assert_eq!(events.first().unwrap().event_type, RunEventType::RunStarted);
        assert_eq!(events.last().unwrap().event_type, RunEventType::RunCompleted);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out() {
        let engine = AgentEngine::new(Arc::new(Stalling), CapabilityRegistry::new());
        let outcome = engine
            .execute(&RunId::new("r1"), "g", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.error.unwrap().contains("timed out"));
        assert_eq!(outcome.final_state, State::Failed);
    }
}
