//! Streaming events.
//!
//! Two levels exist:
//!
//! - [`StreamSignal`] is what a vendor-specific classifier extracts from one
//!   provider event. Tool-call arguments are still fragments here.
//! - [`StreamEvent`] is what a provider adapter hands to the conversation
//!   runner once fragments have been reassembled by the
//!   [`ToolCallAssembler`](super::assembler::ToolCallAssembler).

use crate::conversation::message::ToolInvocation;

/// Classification of a single provider stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// Assistant text, forwarded immediately.
    TextDelta(String),
    /// A tool call begins at `index`. `id` may be absent for some vendors.
    ToolCallStart {
        index: usize,
        id: Option<String>,
        name: String,
    },
    /// Partial argument JSON for the call at `index`.
    ToolCallArgumentFragment { index: usize, fragment: String },
    /// The call at `index` is complete and its arguments may be parsed.
    ToolCallEnd { index: usize },
    /// The provider finished the message.
    StreamEnd,
    /// The provider reported an error inside the stream.
    Error(String),
    /// Keep-alives, usage reports and other events without content.
    Ignorable,
}

/// Neutral streaming event consumed by the conversation runner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text chunk from the model.
    Delta(String),
    /// A fully assembled tool call.
    ToolCall(ToolInvocation),
    /// The stream ended normally.
    Completed,
    /// The stream failed; no further events follow.
    Error(String),
}

impl StreamEvent {
    /// Returns the text content if this is a Delta event.
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEvent::Delta(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this event signals the end of the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed | StreamEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_text_returns_content() {
        let event = StreamEvent::Delta("The goblin snarls".to_string());
        assert_eq!(event.text(), Some("The goblin snarls"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn completed_and_error_are_terminal() {
        assert!(StreamEvent::Completed.is_terminal());
        assert!(StreamEvent::Error("overloaded".to_string()).is_terminal());
    }

    #[test]
    fn tool_call_is_not_terminal() {
        let event = StreamEvent::ToolCall(ToolInvocation::new("1", "roll_dice", json!({})));
        assert!(!event.is_terminal());
        assert_eq!(event.text(), None);
    }
}
