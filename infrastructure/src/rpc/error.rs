//! Error types for the worker transport

use std::time::Duration;
use thiserror::Error;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur when talking to a worker process
#[derive(Error, Debug)]
pub enum RpcError {
    /// No spawn strategy produced a running process.
    #[error("Failed to start worker {worker}: {}", attempts.join("; "))]
    Connect {
        worker: String,
        attempts: Vec<String>,
    },

    #[error("Worker {worker} is not initialized")]
    NotInitialized { worker: String },

    #[error("Request timed out after {}ms: {operation}", elapsed.as_millis())]
    Timeout { operation: String, elapsed: Duration },

    #[error("Worker {worker} disconnected")]
    Disconnected { worker: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The worker answered a request with a JSON-RPC error object.
    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Request id {0} is already pending")]
    DuplicateRequestId(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RpcError {
    pub fn disconnected(worker: &str) -> Self {
        RpcError::Disconnected {
            worker: worker.to_string(),
        }
    }

    /// Whether the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Connect { .. } | RpcError::Disconnected { .. } | RpcError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_lists_attempts() {
        let error = RpcError::Connect {
            worker: "rpg-mcp-server".into(),
            attempts: vec![
                "packaged: not found".into(),
                "direct: permission denied".into(),
            ],
        };
        assert_eq!(
            error.to_string(),
            "Failed to start worker rpg-mcp-server: packaged: not found; direct: permission denied"
        );
        assert!(error.is_fatal());
    }

    #[test]
    fn timeout_reports_elapsed_and_operation() {
        let error = RpcError::Timeout {
            operation: "tools/call:generate_world".into(),
            elapsed: Duration::from_secs(120),
        };
        assert_eq!(
            error.to_string(),
            "Request timed out after 120000ms: tools/call:generate_world"
        );
        assert!(!error.is_fatal());
    }
}
