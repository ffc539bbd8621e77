//! Streaming callbacks
//!
//! Receives the incremental output of
//! [`ConversationRunner::run_streaming`](crate::use_cases::run_conversation::ConversationRunner::run_streaming).
//! Exactly one of [`on_complete`](StreamObserver::on_complete) or
//! [`on_error`](StreamObserver::on_error) is called per run.

use questkeeper_domain::{RunOutcome, ToolInvocation, ToolOutcome};

/// Callbacks for a streamed conversation. All methods default to no-ops.
pub trait StreamObserver: Send + Sync {
    /// A text chunk from the model, in provider order.
    fn on_chunk(&self, _chunk: &str) {}

    /// The model requested a tool.
    fn on_tool_call(&self, _invocation: &ToolInvocation) {}

    /// A requested tool finished.
    fn on_tool_result(&self, _invocation: &ToolInvocation, _outcome: &ToolOutcome) {}

    /// A new internal turn starts; output from the previous one is final.
    fn on_stream_boundary(&self, _turn: usize) {}

    /// The run finished.
    fn on_complete(&self, _outcome: &RunOutcome) {}

    /// The run failed. No other callback follows.
    fn on_error(&self, _message: &str) {}
}

/// Observer that ignores every callback.
pub struct NoStreamObserver;

impl StreamObserver for NoStreamObserver {}
