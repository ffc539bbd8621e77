//! Results of provider calls and orchestration turns.

use super::message::ToolInvocation;
use serde::{Deserialize, Serialize};

/// Neutral reply from a provider adapter's blocking call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
}

impl ProviderResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            invocations: Vec::new(),
        }
    }

    pub fn with_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// Output of one orchestration iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Assistant text produced during the turn (possibly empty).
    pub text: String,
    /// Tool calls the turn requested, fully assembled.
    pub invocations: Vec<ToolInvocation>,
    /// Whether the loop should dispatch another turn.
    pub should_continue: bool,
}

impl TurnResult {
    /// A turn continues exactly when it requested tools.
    pub fn new(text: impl Into<String>, invocations: Vec<ToolInvocation>) -> Self {
        let should_continue = !invocations.is_empty();
        Self {
            text: text.into(),
            invocations,
            should_continue,
        }
    }
}

impl From<ProviderResponse> for TurnResult {
    fn from(response: ProviderResponse) -> Self {
        Self::new(response.text, response.invocations)
    }
}

/// How a top-level run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A turn produced no tool calls; its text is the final answer.
    Completed,
    /// Every turn of the budget requested tools. The returned text is the
    /// best text accumulated so far and may be incomplete.
    BudgetExhausted { turns: usize },
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}
