//! The Run aggregate: one execution of a goal through the phase graph.
//!
//! A Run is owned by exactly one worker loop at a time. All mutation goes
//! through `&mut self` methods, so no internal locking is needed.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Evidence, RunError, RunId, RunStatus, State};

/// A question the run is blocked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// One execution of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    id: RunId,
    goal: String,
    current_state: State,
    vars: HashMap<String, Value>,
    evidence: Vec<Evidence>,
    status: RunStatus,
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_question: Option<PendingQuestion>,
}

impl Run {
    /// Create a run in `pending` status at the `intake` phase.
    pub fn new(id: impl Into<RunId>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            current_state: State::Intake,
            vars: HashMap::new(),
            evidence: Vec::new(),
            status: RunStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            error: None,
            pending_question: None,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn current_state(&self) -> State {
        self.current_state
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn pending_question(&self) -> Option<&PendingQuestion> {
        self.pending_question.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending` -> `running`, stamping the start time. Any other status is left alone.
    pub fn start(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
            self.start_time = Utc::now();
        }
    }

    /// Set the current phase.
    ///
    /// This does not check the edge against the phase graph. Entering a
    /// terminal phase stamps `end_time` and sets the terminal status.
    pub fn transition_to(&mut self, state: State) {
        self.current_state = state;
        if state.is_terminal() {
            self.end_time = Some(Utc::now());
            self.status = if state == State::Done {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            self.pending_question = None;
        }
    }

    pub fn complete(&mut self, result: Value) {
        self.result = Some(result);
        self.transition_to(State::Done);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.transition_to(State::Failed);
    }

    /// `running` -> `paused`. Any other status is left alone.
    pub fn pause(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Paused;
        }
    }

    /// `paused` -> `running`. Any other status is left alone.
    pub fn resume(&mut self) {
        if self.status == RunStatus::Paused {
            self.status = RunStatus::Running;
        }
    }

    /// Check that the run may take another step.
    pub fn ensure_active(&self) -> Result<(), RunError> {
        match self.status {
            RunStatus::Running => Ok(()),
            RunStatus::Pending => Err(RunError::NotStarted(self.id.to_string())),
            RunStatus::Paused => Err(RunError::Paused(self.id.to_string())),
            RunStatus::Completed | RunStatus::Failed => Err(RunError::AlreadyTerminated {
                run_id: self.id.to_string(),
                status: self.status,
            }),
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Read a variable and decode it into `T`. Missing or mistyped values yield `None`.
    pub fn get_var_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.vars
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn add_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
    }

    /// Elapsed wall-clock time: fixed once the run has ended, live otherwise.
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    /// Record a question for a human and pause until it is answered.
    pub fn await_human(
        &mut self,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Result<(), RunError> {
        self.ensure_active()?;
        self.pending_question = Some(PendingQuestion {
            question: question.into(),
            options,
        });
        self.pause();
        Ok(())
    }

    /// Answer the pending question, append it as evidence and resume.
    pub fn provide_human_input(
        &mut self,
        responder: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<(), RunError> {
        let answer = answer.into();
        let pending = self
            .pending_question
            .as_ref()
            .ok_or_else(|| RunError::NoPendingQuestion(self.id.to_string()))?;

        if !pending.options.is_empty() && !pending.options.iter().any(|o| *o == answer) {
            return Err(RunError::InvalidHumanInput {
                answer,
                options: pending.options.clone(),
            });
        }

        let content = json!({ "question": pending.question, "answer": answer });
        self.pending_question = None;
        self.add_evidence(Evidence::human_input(responder, content));
        self.resume();
        Ok(())
    }
}
