//! Conversation messages exchanged with LLM providers.

use crate::core::error::DomainError;
use crate::tool::value_objects::ToolOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool call requested by the model.
///
/// `id` is the correlation key a later [`ConversationMessage::ToolResult`]
/// answers. Vendors normally supply it; when they don't, a locally unique id
/// is generated at detection time so that two calls to the same tool within
/// one turn never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Creates an invocation for a vendor that did not supply an id.
    pub fn with_local_id(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(local_call_id(), name, arguments)
    }

    /// Creates an invocation from arguments delivered as a JSON string.
    ///
    /// An empty string means "no arguments" and becomes `{}`.
    pub fn from_raw_arguments(
        id: Option<String>,
        name: impl Into<String>,
        raw: &str,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let arguments = parse_arguments(raw).map_err(|e| DomainError::InvalidArguments {
            tool: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(id.unwrap_or_else(local_call_id), name, arguments))
    }
}

/// Parses an accumulated argument string, treating blank input as `{}`.
pub(crate) fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

/// Generates a process-unique tool call id (`call_<uuid>`).
pub fn local_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// One entry of the conversation history.
///
/// The history is owned by the conversation runner for the duration of a
/// top-level call and grows by one assistant message plus one tool result per
/// invocation on every tool-using turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invocations: Vec<ToolInvocation>,
    },
    ToolResult {
        invocation_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            invocations: Vec::new(),
        }
    }

    /// Assistant turn that requested one or more tools.
    pub fn assistant_with_invocations(
        content: impl Into<String>,
        invocations: Vec<ToolInvocation>,
    ) -> Self {
        Self::Assistant {
            content: content.into(),
            invocations,
        }
    }

    /// Tool result answering `invocation`.
    pub fn tool_result(invocation: &ToolInvocation, outcome: ToolOutcome) -> Self {
        Self::ToolResult {
            invocation_id: invocation.id.clone(),
            tool_name: invocation.name.clone(),
            outcome,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }

    /// Plain text content, if this message has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Assistant { content, .. } => {
                Some(content)
            }
            Self::ToolResult { .. } => None,
        }
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        match self {
            Self::Assistant { invocations, .. } => invocations,
            _ => &[],
        }
    }
}
