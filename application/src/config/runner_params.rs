//! Conversation runner parameters.
//!
//! [`RunnerParams`] groups the static parameters that bound the tool-call
//! loop in [`ConversationRunner`](crate::use_cases::run_conversation::ConversationRunner).

/// Turn budget and tool execution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerParams {
    /// Maximum provider calls per top-level run, shared by blocking and
    /// streaming mode.
    pub turn_budget: usize,
    /// Execute the tool calls of one turn concurrently.
    pub parallel_tools: bool,
}

impl Default for RunnerParams {
    fn default() -> Self {
        Self {
            turn_budget: 5,
            parallel_tools: true,
        }
    }
}

impl RunnerParams {
    // ==================== Builder Methods ====================

    /// Values below one are raised to one: a run always reaches the provider.
    pub fn with_turn_budget(mut self, turns: usize) -> Self {
        self.turn_budget = turns.max(1);
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }
}
