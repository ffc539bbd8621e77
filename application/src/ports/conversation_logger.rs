//! Port for structured conversation logging.
//!
//! `tracing` carries human-readable diagnostics. This port records the
//! conversation itself (provider turns, tool calls and their results) as
//! machine-readable events, one record per event.

use questkeeper_domain::{RunOutcome, ToolInvocation, ToolOutcome};
use serde_json::{Value, json};

/// A structured conversation event.
#[derive(Debug, Clone)]
pub struct ConversationEvent {
    /// Event type identifier (e.g. "provider_turn", "tool_call").
    pub event_type: &'static str,
    /// Event-specific fields.
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    /// A provider call finished.
    pub fn provider_turn(turn: usize, text: &str, invocations: &[ToolInvocation]) -> Self {
        let names: Vec<&str> = invocations.iter().map(|i| i.name.as_str()).collect();
        Self::new(
            "provider_turn",
            json!({ "turn": turn, "text": text, "tool_calls": names }),
        )
    }

    /// A tool call was dispatched to `owner` (absent when no worker owns it).
    pub fn tool_call(invocation: &ToolInvocation, owner: Option<&str>) -> Self {
        Self::new(
            "tool_call",
            json!({
                "id": invocation.id,
                "tool": invocation.name,
                "owner": owner,
                "arguments": invocation.arguments,
            }),
        )
    }

    pub fn tool_result(invocation: &ToolInvocation, outcome: &ToolOutcome) -> Self {
        Self::new(
            "tool_result",
            json!({
                "id": invocation.id,
                "tool": invocation.name,
                "success": outcome.is_success(),
                "content": outcome.content_value(),
            }),
        )
    }

    pub fn budget_exhausted(outcome: &RunOutcome) -> Self {
        Self::new("turn_budget_exhausted", json!({ "outcome": outcome }))
    }

    pub fn stream_error(message: &str) -> Self {
        Self::new("stream_error", json!({ "message": message }))
    }
}

/// Port for logging conversation events.
///
/// `log` is synchronous and infallible: a logging failure must never
/// interrupt a conversation.
pub trait ConversationLogger: Send + Sync {
    fn log(&self, event: ConversationEvent);
}

/// No-op implementation for tests and when logging is disabled.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}
