//! OpenAI-compatible chat completions adapter (OpenAI and OpenRouter).

use super::pump::{SignalClassifier, spawn_event_pump};
use super::sse::SseEvent;
use super::{HttpProviderOptions, endpoint_url, send_checked};
use async_trait::async_trait;
use questkeeper_application::{ProviderAdapter, ProviderError, ProviderRequest, StreamHandle};
use questkeeper_domain::{
    ConversationMessage, ProviderKind, ProviderResponse, StreamSignal, ToolDescriptor,
    ToolInvocation,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    kind: ProviderKind,
    options: HttpProviderOptions,
}

impl OpenAiCompatibleAdapter {
    pub fn new(client: reqwest::Client, kind: ProviderKind, options: HttpProviderOptions) -> Self {
        Self {
            client,
            kind,
            options,
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ProviderKind::OpenRouter => "OpenRouter",
            _ => "OpenAI",
        }
    }

    fn completions_url(&self) -> String {
        let default = match self.kind {
            ProviderKind::OpenRouter => OPENROUTER_BASE_URL,
            _ => OPENAI_BASE_URL,
        };
        endpoint_url(
            self.options.base_url.as_deref().unwrap_or(default),
            "/chat/completions",
        )
    }

    async fn post(&self, request: &ProviderRequest<'_>, stream: bool) -> Result<reqwest::Response, ProviderError> {
        if request.credentials.is_empty() {
            return Err(ProviderError::MissingCredentials(format!("{} API key", self.kind)));
        }
        let body = build_request_body(
            request.history,
            &request.model.model,
            request.tools,
            self.options.max_tokens,
            stream,
        );
        debug!(
            "{}: POST {} (model: {}, {} messages, {} tools, stream: {})",
            self.label(),
            self.completions_url(),
            request.model.model,
            request.history.len(),
            request.tools.len(),
            stream
        );
        let builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(request.credentials.api_key.trim())
            .json(&body);
        send_checked(builder).await
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
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
            self.label(),
            response.bytes_stream(),
            OpenAiClassifier::default(),
        ))
    }
}

pub fn build_request_body(
    history: &[ConversationMessage],
    model: &str,
    tools: &[ToolDescriptor],
    max_tokens: u32,
    stream: bool,
) -> Value {
    let messages: Vec<Value> = history
        .iter()
        .map(|message| match message {
            ConversationMessage::System { content } => json!({"role": "system", "content": content}),
            ConversationMessage::User { content } => json!({"role": "user", "content": content}),
            ConversationMessage::Assistant {
                content,
                invocations,
            } if invocations.is_empty() => json!({"role": "assistant", "content": content}),
            ConversationMessage::Assistant {
                content,
                invocations,
            } => {
                let tool_calls: Vec<Value> = invocations
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if content.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(content.clone())
                };
                json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
            }
            ConversationMessage::ToolResult {
                invocation_id,
                tool_name,
                outcome,
            } => json!({
                "role": "tool",
                "tool_call_id": invocation_id,
                "name": tool_name,
                "content": outcome.to_content(),
            }),
        })
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
        "stream": stream,
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.input_schema,
                        }
                    })
                })
                .collect(),
        );
    }
    body
}

pub fn parse_response(raw: &str) -> Result<ProviderResponse, ProviderError> {
    let payload: Value =
        serde_json::from_str(raw).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::Decode("response contained no choices".into()))?;

    let mut response = ProviderResponse::from_text(
        message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    );

    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(name) = call.pointer("/function/name").and_then(Value::as_str) else {
            warn!("OpenAI: tool call without a function name");
            continue;
        };
        let raw_arguments = call
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let id = call.get("id").and_then(Value::as_str).map(str::to_string);
        match ToolInvocation::from_raw_arguments(id, name, raw_arguments) {
            Ok(invocation) => response.invocations.push(invocation),
            Err(e) => warn!("OpenAI: dropping tool call: {}", e),
        }
    }
    Ok(response)
}

/// Classifies chat completion chunks.
///
/// Tool calls carry no explicit end event; a `finish_reason` closes every
/// call opened so far.
#[derive(Debug, Default)]
pub struct OpenAiClassifier {
    open: BTreeSet<usize>,
}

impl SignalClassifier for OpenAiClassifier {
    fn classify(&mut self, event: &SseEvent) -> Vec<StreamSignal> {
        let data = event.data.trim();
        if data == "[DONE]" {
            return vec![StreamSignal::StreamEnd];
        }
        let chunk: Value = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("OpenAI: unparseable stream chunk: {}", e);
                return Vec::new();
            }
        };
        if let Some(error) = chunk.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider stream returned an error");
            return vec![StreamSignal::Error(message.to_string())];
        }

        let Some(choice) = chunk.pointer("/choices/0") else {
            return vec![StreamSignal::Ignorable];
        };
        let mut signals = Vec::new();
        let delta = choice.get("delta");

        if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str)
            && !text.is_empty()
        {
            signals.push(StreamSignal::TextDelta(text.to_string()));
        }

        for call in delta
            .and_then(|d| d.get("tool_calls"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
            let id = call.get("id").and_then(Value::as_str).filter(|s| !s.is_empty());
            let name = call.pointer("/function/name").and_then(Value::as_str);
            if id.is_some() || name.is_some() {
                self.open.insert(index);
                signals.push(StreamSignal::ToolCallStart {
                    index,
                    id: id.map(str::to_string),
                    name: name.unwrap_or_default().to_string(),
                });
            }
            if let Some(fragment) = call.pointer("/function/arguments").and_then(Value::as_str)
                && !fragment.is_empty()
            {
                self.open.insert(index);
                signals.push(StreamSignal::ToolCallArgumentFragment {
                    index,
                    fragment: fragment.to_string(),
                });
            }
        }

        if choice.get("finish_reason").is_some_and(|r| !r.is_null()) {
            signals.extend(
                std::mem::take(&mut self.open)
                    .into_iter()
                    .map(|index| StreamSignal::ToolCallEnd { index }),
            );
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use questkeeper_domain::ToolOutcome;

    fn data(value: Value) -> SseEvent {
        SseEvent {
            event: None,
            data: value.to_string(),
        }
    }

    #[test]
    fn body_uses_function_tools_and_tool_role() {
        let call = ToolInvocation::new("call_1", "get_inventory", json!({"characterId": "c1"}));
        let history = vec![
            ConversationMessage::system("Narrate."),
            ConversationMessage::assistant_with_invocations("", vec![call.clone()]),
            ConversationMessage::tool_result(&call, ToolOutcome::Success(json!({"items": []}))),
        ];
        let tools = vec![ToolDescriptor {
            name: "get_inventory".into(),
            description: "List items".into(),
            input_schema: json!({"type": "object"}),
        }];
        let body = build_request_body(&history, "gpt-4o", &tools, 4096, false);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], Value::Null);
        assert_eq!(
            messages[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"characterId":"c1"}"#
        );
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["parameters"], json!({"type": "object"}));
    }

    #[test]
    fn parses_message_with_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "roll_dice", "arguments": "{\"expression\":\"1d8\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "get_world_state", "arguments": ""}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();
        let response = parse_response(&raw).unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.invocations.len(), 2);
        assert_eq!(response.invocations[0].arguments, json!({"expression": "1d8"}));
        assert_eq!(response.invocations[1].arguments, json!({}));
    }

    #[test]
    fn finish_reason_closes_open_calls() {
        let mut classifier = OpenAiClassifier::default();
        let signals = classifier.classify(&data(json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_x", "function": {"name": "roll_dice", "arguments": ""}}
            ]}}]
        })));
        assert_eq!(
            signals,
            vec![StreamSignal::ToolCallStart {
                index: 0,
                id: Some("call_x".into()),
                name: "roll_dice".into()
            }]
        );
        let signals = classifier.classify(&data(json!({
            "choices": [{"delta": {}, "finish_reason": "tool_calls"}]
        })));
        assert_eq!(signals, vec![StreamSignal::ToolCallEnd { index: 0 }]);
        assert_eq!(
            classifier.classify(&SseEvent {
                event: None,
                data: "[DONE]".into()
            }),
            vec![StreamSignal::StreamEnd]
        );
    }

    #[tokio::test]
    async fn stream_without_ids_gets_distinct_local_ids() {
        let chunks = [
            json!({"choices": [{"delta": {"content": "Two rolls"}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"name": "roll_dice", "arguments": "{\"expr"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "ession\":\"1d4\"}"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 1, "function": {"name": "roll_dice", "arguments": "{}"}}]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ];
        let mut body: String = chunks.iter().map(|c| format!("data: {}\n\n", c)).collect();
        body.push_str("data: [DONE]\n\n");
        let pieces: Vec<Result<Vec<u8>, std::io::Error>> =
            body.as_bytes().chunks(11).map(|c| Ok(c.to_vec())).collect();

        let handle = spawn_event_pump("OpenAI", stream::iter(pieces), OpenAiClassifier::default());
        let response = handle.collect().await.unwrap();
        assert_eq!(response.text, "Two rolls");
        assert_eq!(response.invocations.len(), 2);
        assert_eq!(response.invocations[0].arguments, json!({"expression": "1d4"}));
        assert!(response.invocations[0].id.starts_with("call_"));
        assert_ne!(response.invocations[0].id, response.invocations[1].id);
    }
}
