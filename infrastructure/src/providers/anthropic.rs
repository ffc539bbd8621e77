//! Anthropic Messages API adapter.

use super::pump::{SignalClassifier, spawn_event_pump};
use super::sse::SseEvent;
use super::{HttpProviderOptions, endpoint_url, send_checked};
use async_trait::async_trait;
use questkeeper_application::{
    ProviderAdapter, ProviderError, ProviderRequest, StreamHandle,
};
use questkeeper_domain::{
    ConversationMessage, ProviderResponse, StreamSignal, ToolDescriptor, ToolInvocation,
};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    options: HttpProviderOptions,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, options: HttpProviderOptions) -> Self {
        Self { client, options }
    }

    fn messages_url(&self) -> String {
        endpoint_url(
            self.options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            "/messages",
        )
    }

    async fn post(&self, request: &ProviderRequest<'_>, stream: bool) -> Result<reqwest::Response, ProviderError> {
        if request.credentials.is_empty() {
            return Err(ProviderError::MissingCredentials("anthropic API key".into()));
        }
        let body = build_request_body(
            request.history,
            &request.model.model,
            request.tools,
            self.options.max_tokens,
            stream,
        );
        debug!(
            "Anthropic: POST {} (model: {}, {} messages, {} tools, stream: {})",
            self.messages_url(),
            request.model.model,
            request.history.len(),
            request.tools.len(),
            stream
        );
        let builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", request.credentials.api_key.trim())
            .header("anthropic-version", self.options.api_version.as_str())
            .json(&body);
        send_checked(builder).await
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn send_message(&self, request: ProviderRequest<'_>) -> Result<ProviderResponse, ProviderError> {
        let response = self.post(&request, false).await?;
        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        parse_response(&raw)
    }

    async fn stream_message(&self, request: ProviderRequest<'_>) -> Result<StreamHandle, ProviderError> {
        let response = self.post(&request, true).await?;
        Ok(spawn_event_pump(
            "Anthropic",
            response.bytes_stream(),
            AnthropicClassifier,
        ))
    }
}

/// Build a Messages API body.
///
/// System messages move to the top-level `system` field. Consecutive tool
/// results are merged into one user turn, since every result answering an
/// assistant turn must arrive together.
pub fn build_request_body(
    history: &[ConversationMessage],
    model: &str,
    tools: &[ToolDescriptor],
    max_tokens: u32,
    stream: bool,
) -> Value {
    let system: Vec<&str> = history
        .iter()
        .filter_map(|message| match message {
            ConversationMessage::System { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();

    let mut messages: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for message in history {
        if let ConversationMessage::ToolResult {
            invocation_id,
            outcome,
            ..
        } = message
        {
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": invocation_id,
                "content": outcome.to_content(),
            });
            if !outcome.is_success() {
                block["is_error"] = json!(true);
            }
            pending_results.push(block);
            continue;
        }

        if !pending_results.is_empty() {
            messages.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
        }

        match message {
            ConversationMessage::System { .. } | ConversationMessage::ToolResult { .. } => {}
            ConversationMessage::User { content } => {
                messages.push(json!({"role": "user", "content": content}));
            }
            ConversationMessage::Assistant {
                content,
                invocations,
            } if invocations.is_empty() => {
                messages.push(json!({"role": "assistant", "content": content}));
            }
            ConversationMessage::Assistant {
                content,
                invocations,
            } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({"type": "text", "text": content}));
                }
                blocks.extend(invocations.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    })
                }));
                messages.push(json!({"role": "assistant", "content": blocks}));
            }
        }
    }
    if !pending_results.is_empty() {
        messages.push(json!({"role": "user", "content": pending_results}));
    }

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
        "stream": stream,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect(),
        );
    }
    body
}

/// Parse a non-streaming Messages API response.
pub fn parse_response(raw: &str) -> Result<ProviderResponse, ProviderError> {
    let payload: Value =
        serde_json::from_str(raw).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let blocks = payload
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Decode("response has no content blocks".into()))?;

    let mut response = ProviderResponse::default();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    response.text.push_str(text);
                }
            }
            Some("tool_use") => {
                let Some(name) = block.get("name").and_then(Value::as_str) else {
                    warn!("Anthropic: tool_use block without a name");
                    continue;
                };
                let arguments = block.get("input").cloned().unwrap_or_else(|| json!({}));
                let invocation = match block.get("id").and_then(Value::as_str) {
                    Some(id) => ToolInvocation::new(id, name, arguments),
                    None => ToolInvocation::with_local_id(name, arguments),
                };
                response.invocations.push(invocation);
            }
            _ => {}
        }
    }
    Ok(response)
}

/// Classifies Messages API stream events.
///
/// Text and tool-use blocks share the `index` space; a `content_block_stop`
/// for a text block finds no open call and produces nothing.
pub struct AnthropicClassifier;

impl SignalClassifier for AnthropicClassifier {
    fn classify(&mut self, event: &SseEvent) -> Vec<StreamSignal> {
        vec![classify_event(event)]
    }
}

fn classify_event(event: &SseEvent) -> StreamSignal {
    let payload: Value = match serde_json::from_str(&event.data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Anthropic: unparseable stream event: {}", e);
            return StreamSignal::Ignorable;
        }
    };
    let payload_type = payload.get("type").and_then(Value::as_str).unwrap_or_default();
    let event_type = event.event.as_deref().unwrap_or_default();
    let index = payload
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .unwrap_or(0);

    if payload_type == "error" || event_type == "error" {
        let message = payload
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("anthropic stream returned error event");
        return StreamSignal::Error(message.to_string());
    }

    match payload_type {
        "content_block_start" => {
            let block = payload.get("content_block");
            if block.and_then(|b| b.get("type")).and_then(Value::as_str) != Some("tool_use") {
                return StreamSignal::Ignorable;
            }
            StreamSignal::ToolCallStart {
                index,
                id: block
                    .and_then(|b| b.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                name: block
                    .and_then(|b| b.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        }
        "content_block_delta" => {
            let delta = payload.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                Some("text_delta") => StreamSignal::TextDelta(
                    delta
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ),
                Some("input_json_delta") => StreamSignal::ToolCallArgumentFragment {
                    index,
                    fragment: delta
                        .and_then(|d| d.get("partial_json"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                _ => StreamSignal::Ignorable,
            }
        }
        "content_block_stop" => StreamSignal::ToolCallEnd { index },
        "message_stop" => StreamSignal::StreamEnd,
        _ => StreamSignal::Ignorable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use questkeeper_domain::{StreamEvent, ToolError, ToolOutcome};

    fn sse(event: &str, data: Value) -> SseEvent {
        SseEvent {
            event: Some(event.into()),
            data: data.to_string(),
        }
    }

    #[test]
    fn body_extracts_system_and_maps_tool_turns() {
        let call = ToolInvocation::new("toolu_1", "get_character", json!({"id": "c1"}));
        let history = vec![
            ConversationMessage::system("You are the dungeon master."),
            ConversationMessage::user("Who am I?"),
            ConversationMessage::assistant_with_invocations("Checking.", vec![call.clone()]),
            ConversationMessage::tool_result(&call, ToolOutcome::Success(json!({"name": "Vex"}))),
        ];
        let tools = vec![ToolDescriptor {
            name: "get_character".into(),
            description: "Fetch a character".into(),
            input_schema: json!({"type": "object"}),
        }];

        let body = build_request_body(&history, "claude-3-5-sonnet-latest", &tools, 4096, false);

        assert_eq!(body["system"], "You are the dungeon master.");
        assert_eq!(body["max_tokens"], 4096);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], json!({"role": "user", "content": "Who am I?"}));
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"], json!({"id": "c1"}));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[2]["content"][0]["content"], r#"{"name":"Vex"}"#);
        assert_eq!(body["tools"][0]["input_schema"], json!({"type": "object"}));
    }

    #[test]
    fn consecutive_tool_results_share_one_user_turn() {
        let a = ToolInvocation::new("t1", "roll_dice", json!({}));
        let b = ToolInvocation::new("t2", "roll_dice", json!({}));
        let history = vec![
            ConversationMessage::user("Roll twice"),
            ConversationMessage::assistant_with_invocations("", vec![a.clone(), b.clone()]),
            ConversationMessage::tool_result(&a, ToolOutcome::Success(json!(3))),
            ConversationMessage::tool_result(&b, ToolOutcome::Failure(ToolError::new("E", "jammed"))),
        ];
        let body = build_request_body(&history, "m", &[], 1024, true);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["is_error"], true);
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn parses_text_and_tool_use_blocks() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_9", "name": "get_region_map", "input": {"region": 4}}
            ],
            "stop_reason": "tool_use"
        })
        .to_string();
        let response = parse_response(&raw).unwrap();
        assert_eq!(response.text, "Let me look.");
        assert_eq!(
            response.invocations,
            vec![ToolInvocation::new("toolu_9", "get_region_map", json!({"region": 4}))]
        );
    }

    #[test]
    fn classifies_stream_events() {
        assert_eq!(
            classify_event(&sse(
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}})
            )),
            StreamSignal::TextDelta("Hi".into())
        );
        assert_eq!(
            classify_event(&sse(
                "content_block_start",
                json!({"type": "content_block_start", "index": 1,
                       "content_block": {"type": "tool_use", "id": "toolu_1", "name": "roll_dice", "input": {}}})
            )),
            StreamSignal::ToolCallStart {
                index: 1,
                id: Some("toolu_1".into()),
                name: "roll_dice".into()
            }
        );
        assert_eq!(
            classify_event(&sse("ping", json!({"type": "ping"}))),
            StreamSignal::Ignorable
        );
        assert_eq!(
            classify_event(&sse(
                "error",
                json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})
            )),
            StreamSignal::Error("Overloaded".into())
        );
    }

    #[tokio::test]
    async fn stream_reassembles_fragmented_tool_input() {
        let frames = [
            ("message_start", json!({"type": "message_start", "message": {"usage": {"input_tokens": 10}}})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Rolling"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("content_block_start", json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_7", "name": "roll_dice", "input": {}}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"expr"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "ession\": \"2d6"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "+3\"}"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}})),
            ("message_stop", json!({"type": "message_stop"})),
        ];
        let body: String = frames
            .iter()
            .map(|(event, data)| format!("event: {}\ndata: {}\n\n", event, data))
            .collect();
        // Deliver in awkward 7-byte pieces.
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            body.as_bytes().chunks(7).map(|c| Ok(c.to_vec())).collect();

        let handle = spawn_event_pump("Anthropic", stream::iter(chunks), AnthropicClassifier);
        let response = handle.collect().await.unwrap();
        assert_eq!(response.text, "Rolling");
        assert_eq!(
            response.invocations,
            vec![ToolInvocation::new("toolu_7", "roll_dice", json!({"expression": "2d6+3"}))]
        );
    }

    #[tokio::test]
    async fn stream_error_event_surfaces_as_error() {
        let body = format!(
            "event: error\ndata: {}\n\n",
            json!({"type": "error", "error": {"message": "Overloaded"}})
        );
        let mut handle = spawn_event_pump(
            "Anthropic",
            stream::iter(vec![Ok::<_, std::io::Error>(body.into_bytes())]),
            AnthropicClassifier,
        );
        assert_eq!(handle.next().await, Some(StreamEvent::Error("Overloaded".into())));
        assert_eq!(handle.next().await, None);
    }
}
