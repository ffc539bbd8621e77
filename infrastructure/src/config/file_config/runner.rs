//! Conversation runner configuration (`[runner]` section)

use questkeeper_application::RunnerParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRunnerConfig {
    /// Maximum provider calls per top-level request.
    pub turn_budget: usize,
    /// Execute independent tool calls of one turn concurrently.
    pub parallel_tools: bool,
}

impl Default for FileRunnerConfig {
    fn default() -> Self {
        let params = RunnerParams::default();
        Self {
            turn_budget: params.turn_budget,
            parallel_tools: params.parallel_tools,
        }
    }
}

impl FileRunnerConfig {
    pub fn to_params(&self) -> RunnerParams {
        RunnerParams::default()
            .with_turn_budget(self.turn_budget)
            .with_parallel_tools(self.parallel_tools)
    }
}
