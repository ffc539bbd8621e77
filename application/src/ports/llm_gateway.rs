//! Provider adapter port
//!
//! Defines how the conversation runner talks to an LLM vendor. Adapters turn
//! the neutral history and tool catalog into a vendor request, and turn the
//! vendor's reply (or event stream) back into neutral types.

use async_trait::async_trait;
use questkeeper_domain::{
    ConversationMessage, ModelSelection, ProviderResponse, StreamEvent, ToolDescriptor,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while calling a provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// API credentials for a provider call.
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything an adapter needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub history: &'a [ConversationMessage],
    pub credentials: &'a Credentials,
    pub model: &'a ModelSelection,
    /// Tools to advertise. Empty when the model cannot call tools or none
    /// are available.
    pub tools: &'a [ToolDescriptor],
}

/// Handle for receiving streaming events from a provider.
///
/// Events arrive strictly in the order the provider produced them.
pub struct StreamHandle {
    pub receiver: mpsc::Receiver<StreamEvent>,
}

impl StreamHandle {
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Next event, or `None` once the adapter has dropped its sender.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Consume the stream into a single response.
    ///
    /// A channel that closes without `Completed` yields what was received.
    pub async fn collect(mut self) -> Result<ProviderResponse, ProviderError> {
        let mut response = ProviderResponse::default();
        while let Some(event) = self.receiver.recv().await {
            match event {
                StreamEvent::Delta(chunk) => response.text.push_str(&chunk),
                StreamEvent::ToolCall(invocation) => response.invocations.push(invocation),
                StreamEvent::Completed => break,
                StreamEvent::Error(e) => return Err(ProviderError::Stream(e)),
            }
        }
        Ok(response)
    }
}

/// Adapter for one LLM vendor
///
/// Implementations live in the infrastructure layer.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Send the history and wait for the complete reply.
    async fn send_message(
        &self,
        request: ProviderRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Send the history and receive the reply as a stream of events.
    ///
    /// Default implementation calls `send_message()` and replays the reply as
    /// one `Delta`, its tool calls and `Completed`.
    async fn stream_message(
        &self,
        request: ProviderRequest<'_>,
    ) -> Result<StreamHandle, ProviderError> {
        let response = self.send_message(request).await?;
        let (tx, rx) = mpsc::channel(response.invocations.len() + 2);
        if !response.text.is_empty() {
            let _ = tx.send(StreamEvent::Delta(response.text)).await;
        }
        for invocation in response.invocations {
            let _ = tx.send(StreamEvent::ToolCall(invocation)).await;
        }
        let _ = tx.send(StreamEvent::Completed).await;
        Ok(StreamHandle::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questkeeper_domain::{ProviderKind, ToolInvocation};
    use serde_json::json;

    struct FixedAdapter(ProviderResponse);

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        async fn send_message(
            &self,
            _request: ProviderRequest<'_>,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn default_stream_replays_blocking_reply() {
        let reply = ProviderResponse::from_text("Roll for initiative.")
            .with_invocation(ToolInvocation::new("t1", "roll_dice", json!({"expression": "1d20"})));
        let adapter = FixedAdapter(reply.clone());
        let selection = ModelSelection::new(ProviderKind::Anthropic, "claude-3-5-sonnet-latest");
        let credentials = Credentials::default();
        let request = ProviderRequest {
            history: &[],
            credentials: &credentials,
            model: &selection,
            tools: &[],
        };

        let mut handle = adapter.stream_message(request).await.unwrap();
        assert_eq!(
            handle.next().await,
            Some(StreamEvent::Delta("Roll for initiative.".into()))
        );
        assert!(matches!(handle.next().await, Some(StreamEvent::ToolCall(_))));
        assert_eq!(handle.next().await, Some(StreamEvent::Completed));

        let collected = adapter.stream_message(request).await.unwrap().collect().await.unwrap();
        assert_eq!(collected, reply);
    }

    #[tokio::test]
    async fn collect_surfaces_stream_errors() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamEvent::Delta("partial".into())).await.unwrap();
        tx.send(StreamEvent::Error("overloaded".into())).await.unwrap();
        drop(tx);
        let err = StreamHandle::new(rx).collect().await.unwrap_err();
        assert!(matches!(err, ProviderError::Stream(ref m) if m == "overloaded"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let debug = format!("{:?}", Credentials::new("sk-secret"));
        assert!(!debug.contains("sk-secret"));
    }
}
