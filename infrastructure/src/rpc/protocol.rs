//! JSON-RPC 2.0 message types for the worker protocol.
//!
//! Every message is one JSON object on one line, in both directions.
//!
//! - **Requests**: client → worker (`initialize`, `tools/list`, `tools/call`)
//! - **Responses**: worker → client (result or error, correlated by `id`)
//! - **Notifications**: either direction, no `id` (`notifications/initialized`)

use questkeeper_domain::{ToolDescriptor, ToolError, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::RpcError;

/// Protocol revision sent in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Client identity sent in the handshake.
pub const CLIENT_NAME: &str = "quest-keeper-client";
pub const CLIENT_VERSION: &str = "0.2.0";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification (no id, no response)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// The result, or the error object as [`RpcError::Rpc`].
    ///
    /// A response carrying neither yields `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `initialize` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: json!({}),
            client_info: ClientInfo {
                name: CLIENT_NAME,
                version: CLIENT_VERSION,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams<'a> {
    pub name: &'a str,
    pub arguments: &'a Value,
}

/// `tools/list` result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// Interpret a `tools/call` result payload.
///
/// Payloads flagged `isError: true` are worker-reported tool failures; the
/// raw payload is kept as error data so the model still sees the details.
pub fn tool_outcome_from_result(payload: Value) -> ToolOutcome {
    let is_error = payload
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_error {
        return ToolOutcome::Success(payload);
    }
    let message = payload
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find_map(|b| b.get("text")?.as_str()))
        .unwrap_or("Tool reported an error")
        .to_string();
    ToolOutcome::Failure(ToolError::new("WORKER_ERROR", message).with_data(payload))
}
