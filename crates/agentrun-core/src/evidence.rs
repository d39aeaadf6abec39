//! Immutable observations appended to a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Output (or error) of a capability call.
    ToolResult,
    /// An answer supplied by a human.
    HumanInput,
    /// A note recorded by the orchestrator itself.
    SystemNote,
}

/// A timestamped observation. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    evidence_type: EvidenceType,
    source: String,
    content: Value,
    timestamp: DateTime<Utc>,
}

impl Evidence {
    fn new(evidence_type: EvidenceType, source: impl Into<String>, content: Value) -> Self {
        Self {
            evidence_type,
            source: source.into(),
            content,
            timestamp: Utc::now(),
        }
    }

    /// Evidence produced by invoking the capability `tool`.
    pub fn tool_result(tool: impl Into<String>, content: Value) -> Self {
        Self::new(EvidenceType::ToolResult, tool, content)
    }

    /// Evidence supplied by a human responder.
    pub fn human_input(responder: impl Into<String>, content: Value) -> Self {
        Self::new(EvidenceType::HumanInput, responder, content)
    }

    /// A free-form note from the orchestrator.
    pub fn system_note(source: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(EvidenceType::SystemNote, source, Value::String(note.into()))
    }

    pub fn evidence_type(&self) -> EvidenceType {
        self.evidence_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_type() {
        let e = Evidence::tool_result("http_get", json!({"status": 200}));
        assert_eq!(e.evidence_type(), EvidenceType::ToolResult);
        assert_eq!(e.source(), "http_get");
        assert_eq!(e.content()["status"], 200);

        let e = Evidence::system_note("engine", "rejected");
        assert_eq!(e.evidence_type(), EvidenceType::SystemNote);
        assert_eq!(e.content(), &json!("rejected"));
    }

    #[test]
    fn test_wire_field_names() {
        let e = Evidence::human_input("operator", json!("yes"));
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["type"], "human_input");
        assert_eq!(value["source"], "operator");
        assert!(value.get("timestamp").is_some());
    }
}
