//! Tool execution outcomes.
//!
//! A failed tool call is a normal conversational outcome: the model sees the
//! failure in the next turn and can react to it. [`ToolOutcome`] therefore
//! carries failures as data instead of raising them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Error reported for a single tool call.
///
/// | Code | Description |
/// |------|-------------|
/// | `NOT_FOUND` | No worker advertises the tool |
/// | `WORKER_ERROR` | The worker answered with an error |
/// | `TIMEOUT` | The worker did not answer in time |
/// | `TRANSPORT` | The worker connection failed |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn not_found(tool: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", format!("Unknown tool: {}", tool.into()))
    }

    /// Error object returned by the worker for a `tools/call` request.
    pub fn from_worker(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        let error = Self::new("WORKER_ERROR", message);
        match data {
            Some(data) => error.with_data(json!({ "rpc_code": code, "data": data })),
            None => error.with_data(json!({ "rpc_code": code })),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::new(
            "TIMEOUT",
            format!("Operation timed out: {}", operation.into()),
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new("TRANSPORT", message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Result payload of one tool call: success data or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(Value),
    Failure(ToolError),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// Value handed back to the model: the raw payload, or `{"error": message}`.
    pub fn content_value(&self) -> Value {
        match self {
            ToolOutcome::Success(payload) => payload.clone(),
            ToolOutcome::Failure(error) => json!({ "error": error.message }),
        }
    }

    /// JSON text of [`content_value`](Self::content_value).
    pub fn to_content(&self) -> String {
        self.content_value().to_string()
    }
}
