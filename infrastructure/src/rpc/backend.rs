//! Exposes worker clients through the application's tool ports.

use super::client::RpcClient;
use super::error::RpcError;
use super::manager::RpcManager;
use async_trait::async_trait;
use questkeeper_application::{ToolBackend, ToolBackendError, ToolCallRequest, ToolHost};
use questkeeper_domain::{ToolDescriptor, ToolOutcome};
use serde_json::Value;
use std::sync::Arc;

impl From<RpcError> for ToolBackendError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Connect { .. } => ToolBackendError::Unavailable(error.to_string()),
            RpcError::NotInitialized { worker } => ToolBackendError::NotInitialized(worker),
            RpcError::Timeout { operation, elapsed } => ToolBackendError::Timeout {
                operation,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            },
            RpcError::Disconnected { worker } => ToolBackendError::Disconnected(worker),
            RpcError::Protocol(_) | RpcError::Serialization(_) | RpcError::DuplicateRequestId(_) => {
                ToolBackendError::Protocol(error.to_string())
            }
            RpcError::Rpc { .. } | RpcError::Io(_) => ToolBackendError::Other(error.to_string()),
        }
    }
}

#[async_trait]
impl ToolBackend for RpcClient {
    fn name(&self) -> &str {
        RpcClient::name(self)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolBackendError> {
        Ok(RpcClient::list_tools(self).await?)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome, ToolBackendError> {
        Ok(RpcClient::call_tool(self, name, arguments).await?)
    }

    async fn call_tools_batch(
        &self,
        calls: Vec<ToolCallRequest>,
    ) -> Vec<Result<ToolOutcome, ToolBackendError>> {
        RpcClient::call_tools_batch(self, calls)
            .await
            .into_iter()
            .map(|result| result.map_err(ToolBackendError::from))
            .collect()
    }
}

impl ToolHost for RpcManager {
    fn backends(&self) -> Vec<Arc<dyn ToolBackend>> {
        self.clients()
            .iter()
            .map(|client| Arc::clone(client) as Arc<dyn ToolBackend>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::tests::ready_client;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn transport_errors_map_to_backend_errors() {
        let error: ToolBackendError = RpcError::Timeout {
            operation: "tools/call:get_region_map".into(),
            elapsed: Duration::from_millis(120_004),
        }
        .into();
        assert_eq!(
            error,
            ToolBackendError::Timeout {
                operation: "tools/call:get_region_map".into(),
                elapsed_ms: 120_004
            }
        );

        let error: ToolBackendError = RpcError::NotInitialized {
            worker: "rpg-mcp-server".into(),
        }
        .into();
        assert_eq!(error, ToolBackendError::NotInitialized("rpg-mcp-server".into()));
    }

    #[tokio::test]
    async fn manager_exposes_clients_as_backends() {
        let (client, mut worker) = ready_client("game-state").await;
        let manager = RpcManager::new(vec![client]);
        let backends = manager.backends();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].name(), "game-state");

        let backend = Arc::clone(&backends[0]);
        let call = tokio::spawn(async move { backend.call_tool("roll_dice", json!({"sides": 20})).await });
        let request = worker.next_message().await;
        assert_eq!(request["params"], json!({"name": "roll_dice", "arguments": {"sides": 20}}));
        worker
            .respond(request["id"].as_u64().unwrap(), json!({"total": 20}))
            .await;
        assert_eq!(call.await.unwrap(), Ok(ToolOutcome::Success(json!({"total": 20}))));
    }
}
