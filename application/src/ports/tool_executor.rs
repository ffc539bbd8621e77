//! Tool backend port
//!
//! The conversation runner only sees this public call surface. Worker
//! processes, framing and pending-request bookkeeping stay behind it.

use async_trait::async_trait;
use futures::future::join_all;
use questkeeper_domain::{ToolDescriptor, ToolError, ToolInvocation, ToolOutcome};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Transport-level failure of a tool backend.
///
/// Worker-side tool errors are not represented here; they arrive as
/// [`ToolOutcome::Failure`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolBackendError {
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    #[error("Worker not initialized: {0}")]
    NotInitialized(String),

    #[error("Timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Worker disconnected: {0}")]
    Disconnected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl ToolBackendError {
    /// Convert into the error payload the model sees for a failed call.
    pub fn into_tool_error(self) -> ToolError {
        match self {
            ToolBackendError::Timeout { ref operation, .. } => {
                ToolError::timeout(operation.clone())
            }
            other => ToolError::transport(other.to_string()),
        }
    }
}

/// One entry of a batch call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

impl From<&ToolInvocation> for ToolCallRequest {
    fn from(invocation: &ToolInvocation) -> Self {
        Self::new(invocation.name.clone(), invocation.arguments.clone())
    }
}

/// A named source of tools, typically one worker process.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Logical name used as the owner in the tool catalog.
    fn name(&self) -> &str;

    /// The backend's current tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolBackendError>;

    /// Execute a single tool.
    async fn call_tool(&self, name: &str, arguments: Value)
    -> Result<ToolOutcome, ToolBackendError>;

    /// Execute independent calls concurrently.
    ///
    /// Each slot carries its own result; one failure never fails the batch.
    async fn call_tools_batch(
        &self,
        calls: Vec<ToolCallRequest>,
    ) -> Vec<Result<ToolOutcome, ToolBackendError>> {
        join_all(
            calls
                .into_iter()
                .map(|call| async move { self.call_tool(&call.name, call.arguments).await }),
        )
        .await
    }
}

/// Supplies the backends a conversation may use.
pub trait ToolHost: Send + Sync {
    fn backends(&self) -> Vec<Arc<dyn ToolBackend>>;
}

/// Host without any tools.
pub struct NoTools;

impl ToolHost for NoTools {
    fn backends(&self) -> Vec<Arc<dyn ToolBackend>> {
        Vec::new()
    }
}
