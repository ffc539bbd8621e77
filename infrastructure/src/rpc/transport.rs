//! Frame interpretation for the worker's stdout.
//!
//! - [`parse_frame`] decides whether a line is protocol, incidental log
//!   output, or a malformed message.
//! - [`classify_message`] inspects `id` / `method` to decide how the reader
//!   task dispatches a parsed message.

use serde_json::Value;

/// One line read from the worker's stdout.
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// A JSON object.
    Message(Value),
    /// Anything that does not start with `{`: worker logging, not protocol.
    Log(String),
    /// Starts with `{` but is not valid JSON.
    Malformed { line: String, error: String },
    /// Blank line.
    Empty,
}

/// Interpret one newline-delimited line.
pub fn parse_frame(line: &str) -> Frame {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Frame::Empty;
    }
    if !trimmed.starts_with('{') {
        return Frame::Log(trimmed.to_string());
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Frame::Message(value),
        Err(e) => Frame::Malformed {
            line: trimmed.to_string(),
            error: e.to_string(),
        },
    }
}

/// Classification of an incoming JSON-RPC message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response { id: u64 },
    /// A request from the worker (has `id` + `method`). Not supported.
    IncomingRequest { id: u64, method: String },
    /// A notification (has `method`, no `id`), e.g. progress or logging.
    Notification { method: String },
    /// Neither a usable `id` nor a `method`, e.g. an error with `id: null`.
    Unknown,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &Value) -> MessageKind {
    let id = json.get("id").and_then(Value::as_u64);
    let method = json.get("method").and_then(Value::as_str);

    match (id, method) {
        (Some(id), Some(method)) => MessageKind::IncomingRequest {
            id,
            method: method.to_string(),
        },
        (Some(id), None) => MessageKind::Response { id },
        (None, Some(method)) => MessageKind::Notification {
            method: method.to_string(),
        },
        (None, None) => MessageKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_lines_are_not_protocol() {
        assert_eq!(
            parse_frame("RPG MCP Server running on stdio"),
            Frame::Log("RPG MCP Server running on stdio".into())
        );
        assert_eq!(parse_frame("   "), Frame::Empty);
    }

    #[test]
    fn truncated_object_is_malformed() {
        match parse_frame(r#"{"jsonrpc":"2.0","id":4,"res"#) {
            Frame::Malformed { line, .. } => assert!(line.starts_with("{\"jsonrpc\"")),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn valid_object_is_message() {
        assert_eq!(
            parse_frame(r#" {"id":1,"result":{}} "#),
            Frame::Message(json!({"id": 1, "result": {}}))
        );
    }

    #[test]
    fn classify_response() {
        let json = json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        assert_eq!(classify_message(&json), MessageKind::Response { id: 1 });
    }

    #[test]
    fn classify_incoming_request() {
        let json = json!({"id": 9, "method": "sampling/createMessage", "params": {}});
        assert_eq!(
            classify_message(&json),
            MessageKind::IncomingRequest {
                id: 9,
                method: "sampling/createMessage".into()
            }
        );
    }

    #[test]
    fn classify_notification() {
        let json = json!({"method": "notifications/message", "params": {}});
        assert_eq!(
            classify_message(&json),
            MessageKind::Notification {
                method: "notifications/message".into()
            }
        );
    }

    #[test]
    fn classify_null_id_error() {
        let json = json!({"id": null, "error": {"code": -32700, "message": "Parse error"}});
        assert_eq!(classify_message(&json), MessageKind::Unknown);
    }
}
