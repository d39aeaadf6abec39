//! The planner's chosen next step for a run.
//!
//! On the wire a decision is a JSON object with a `type` discriminant and the
//! fields of exactly one variant:
//!
//! ```json
//! {"type": "call_tool", "name": "http_get", "input": {"url": "..."}, "reason": "fetch page"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::State;

/// Invoke a named capability. Only meaningful while the run is in `act`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTool {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub reason: String,
}

/// Move the run to another phase. `reason` is for the audit trail only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to_state: State,
    #[serde(default)]
    pub reason: String,
}

/// Suspend the run until a human answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskHuman {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// End the run successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finish {
    pub summary: String,
    #[serde(default)]
    pub result: Value,
}

/// End the run with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fail {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Outcome of one planning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    CallTool(CallTool),
    Transition(Transition),
    AskHuman(AskHuman),
    Finish(Finish),
    Fail(Fail),
}

impl Decision {
    pub fn call_tool(name: impl Into<String>, input: Value, reason: impl Into<String>) -> Self {
        Self::CallTool(CallTool {
            name: name.into(),
            input,
            reason: reason.into(),
        })
    }

    pub fn transition(to_state: State, reason: impl Into<String>) -> Self {
        Self::Transition(Transition {
            to_state,
            reason: reason.into(),
        })
    }

    pub fn ask_human(question: impl Into<String>, options: Vec<String>) -> Self {
        Self::AskHuman(AskHuman {
            question: question.into(),
            options,
        })
    }

    pub fn finish(summary: impl Into<String>, result: Value) -> Self {
        Self::Finish(Finish {
            summary: summary.into(),
            result,
        })
    }

    pub fn fail(reason: impl Into<String>, cause: Option<String>) -> Self {
        Self::Fail(Fail {
            reason: reason.into(),
            cause,
        })
    }

    /// Wire discriminant of this decision.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CallTool(_) => "call_tool",
            Self::Transition(_) => "transition",
            Self::AskHuman(_) => "ask_human",
            Self::Finish(_) => "finish",
            Self::Fail(_) => "fail",
        }
    }

    /// Only `finish` and `fail` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish(_) | Self::Fail(_))
    }

    pub fn as_call_tool(&self) -> Option<&CallTool> {
        match self {
            Self::CallTool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_transition(&self) -> Option<&Transition> {
        match self {
            Self::Transition(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ask_human(&self) -> Option<&AskHuman> {
        match self {
            Self::AskHuman(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_finish(&self) -> Option<&Finish> {
        match self {
            Self::Finish(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_fail(&self) -> Option<&Fail> {
        match self {
            Self::Fail(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallTool(c) => write!(f, "call_tool({})", c.name),
            Self::Transition(t) => write!(f, "transition({})", t.to_state),
            Self::AskHuman(_) => f.write_str("ask_human"),
            Self::Finish(_) => f.write_str("finish"),
            Self::Fail(e) => write!(f, "fail({})", e.reason),
        }
    }
}
