//! Human-in-the-loop answers for `ask_human` decisions.

use async_trait::async_trait;
use thiserror::Error;

use agentrun_core::RunId;

#[derive(Debug, Error)]
pub enum HumanInputError {
    #[error("No answer available: {0}")]
    Unavailable(String),
}

/// Source of answers to questions a run is blocked on.
#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Identifier recorded as the evidence source.
    fn responder(&self) -> &str {
        "human"
    }

    async fn ask(
        &self,
        run_id: &RunId,
        question: &str,
        options: &[String],
    ) -> Result<String, HumanInputError>;
}
