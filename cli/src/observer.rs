//! Console rendering of a streamed run.

use questkeeper_application::StreamObserver;
use questkeeper_domain::{RunOutcome, ToolInvocation, ToolOutcome};
use std::io::Write;
use std::sync::Mutex;

/// Writes chunks as they arrive and marks tool activity on its own line.
pub struct ConsoleObserver<W> {
    out: Mutex<W>,
}

impl ConsoleObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> StreamObserver for ConsoleObserver<W> {
    fn on_chunk(&self, chunk: &str) {
        self.emit(chunk);
    }

    fn on_tool_call(&self, invocation: &ToolInvocation) {
        self.emit(&format!("\n[tool] {}\n", invocation.name));
    }

    fn on_tool_result(&self, invocation: &ToolInvocation, outcome: &ToolOutcome) {
        if let ToolOutcome::Failure(error) = outcome {
            self.emit(&format!("[tool] {} failed: {}\n", invocation.name, error.message));
        }
    }

    fn on_stream_boundary(&self, _turn: usize) {
        self.emit("\n");
    }

    fn on_complete(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed => self.emit("\n"),
            RunOutcome::BudgetExhausted { turns } => {
                self.emit(&format!("\n[stopped after {} turns]\n", turns))
            }
        }
    }

    fn on_error(&self, message: &str) {
        self.emit(&format!("\n[error] {}\n", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questkeeper_domain::ToolError;
    use serde_json::json;

    #[test]
    fn renders_chunks_tools_and_boundaries() {
        let observer = ConsoleObserver::new(Vec::new());
        let call = ToolInvocation::new("call_1", "roll_dice", json!({"expression": "1d20"}));
        observer.on_chunk("Rolling");
        observer.on_tool_call(&call);
        observer.on_tool_result(&call, &ToolOutcome::Success(json!({"total": 17})));
        observer.on_stream_boundary(2);
        observer.on_chunk("You rolled 17.");
        observer.on_complete(&RunOutcome::Completed);

        let printed = String::from_utf8(observer.into_inner()).unwrap();
        assert_eq!(printed, "Rolling\n[tool] roll_dice\n\nYou rolled 17.\n");
    }

    #[test]
    fn failures_and_budget_stop_are_visible() {
        let observer = ConsoleObserver::new(Vec::new());
        let call = ToolInvocation::new("call_2", "cast_spell", json!({}));
        observer.on_tool_result(&call, &ToolOutcome::Failure(ToolError::not_found("cast_spell")));
        observer.on_complete(&RunOutcome::BudgetExhausted { turns: 5 });

        let printed = String::from_utf8(observer.into_inner()).unwrap();
        assert!(printed.contains("[tool] cast_spell failed: Unknown tool: cast_spell"));
        assert!(printed.ends_with("[stopped after 5 turns]\n"));
    }
}
