//! Drives a provider byte stream into neutral [`StreamEvent`]s.
//!
//! The pump owns the whole decoding pipeline for one response:
//!
//! ```text
//! bytes -> SseDecoder -> SignalClassifier -> ToolCallAssembler -> mpsc -> StreamHandle
//! ```
//!
//! Events are forwarded in the order they were received. A tool call whose
//! arguments cannot be parsed is logged and dropped; the rest of the stream
//! continues.

use super::sse::{SseDecoder, SseEvent};
use futures::{Stream, StreamExt};
use questkeeper_application::StreamHandle;
use questkeeper_domain::{StreamEvent, StreamSignal, ToolCallAssembler};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Vendor-specific classification of SSE events.
pub trait SignalClassifier: Send + 'static {
    fn classify(&mut self, event: &SseEvent) -> Vec<StreamSignal>;
}

/// Spawn a task decoding `bytes` and return the receiving handle.
pub fn spawn_event_pump<S, B, E, C>(provider: &'static str, bytes: S, classifier: C) -> StreamHandle
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    C: SignalClassifier,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(pump(provider, bytes, classifier, tx));
    StreamHandle::new(rx)
}

struct Pipeline<C> {
    provider: &'static str,
    decoder: SseDecoder,
    classifier: C,
    assembler: ToolCallAssembler,
    tx: mpsc::Sender<StreamEvent>,
}

enum Flow {
    Continue,
    Stop,
}

impl<C: SignalClassifier> Pipeline<C> {
    async fn feed(&mut self, event: SseEvent) -> Flow {
        for signal in self.classifier.classify(&event) {
            for result in self.assembler.apply(signal) {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("{}: dropping tool call: {}", self.provider, e);
                        continue;
                    }
                };
                let terminal = event.is_terminal();
                if self.tx.send(event).await.is_err() {
                    debug!("{}: stream receiver dropped", self.provider);
                    return Flow::Stop;
                }
                if terminal {
                    return Flow::Stop;
                }
            }
        }
        Flow::Continue
    }

    /// Close open calls and complete, as if the vendor had sent its end marker.
    async fn finish(&mut self) {
        for result in self.assembler.apply(StreamSignal::StreamEnd) {
            match result {
                Ok(event) => {
                    if self.tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{}: dropping tool call: {}", self.provider, e),
            }
        }
    }

    async fn fail(&mut self, message: String) {
        let _ = self.tx.send(StreamEvent::Error(message)).await;
    }
}

async fn pump<S, B, E, C>(provider: &'static str, bytes: S, classifier: C, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    C: SignalClassifier,
{
    let mut pipeline = Pipeline {
        provider,
        decoder: SseDecoder::new(),
        classifier,
        assembler: ToolCallAssembler::new(),
        tx,
    };
    let mut bytes = std::pin::pin!(bytes);

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("{}: stream read failed: {}", provider, e);
                pipeline.fail(format!("stream interrupted: {}", e)).await;
                return;
            }
        };
        for event in pipeline.decoder.push(chunk.as_ref()) {
            if let Flow::Stop = pipeline.feed(event).await {
                return;
            }
        }
    }

    if let Some(event) = pipeline.decoder.finish()
        && let Flow::Stop = pipeline.feed(event).await
    {
        return;
    }

    // The body ended without an explicit end marker.
    debug!("{}: stream closed without end marker", provider);
    pipeline.finish().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    /// `data` is either plain text or `tool:<index>:<name>`, `arg:<index>:<json>`,
    /// `end:<index>`, `done`.
    struct LineClassifier;

    impl SignalClassifier for LineClassifier {
        fn classify(&mut self, event: &SseEvent) -> Vec<StreamSignal> {
            let parts: Vec<&str> = event.data.splitn(3, ':').collect();
            let signal = match parts.as_slice() {
                ["tool", index, name] => StreamSignal::ToolCallStart {
                    index: index.parse().unwrap(),
                    id: None,
                    name: name.to_string(),
                },
                ["arg", index, json] => StreamSignal::ToolCallArgumentFragment {
                    index: index.parse().unwrap(),
                    fragment: json.to_string(),
                },
                ["end", index] => StreamSignal::ToolCallEnd {
                    index: index.parse().unwrap(),
                },
                ["done"] => StreamSignal::StreamEnd,
                _ => StreamSignal::TextDelta(event.data.clone()),
            };
            vec![signal]
        }
    }

    /// Keeps per-stream state in a `Cell`, so it is `Send` but not `Sync`.
    struct CountingClassifier {
        seen: std::cell::Cell<usize>,
    }

    impl SignalClassifier for CountingClassifier {
        fn classify(&mut self, event: &SseEvent) -> Vec<StreamSignal> {
            self.seen.set(self.seen.get() + 1);
            vec![StreamSignal::TextDelta(format!("{}:{}", self.seen.get(), event.data))]
        }
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<StreamEvent> {
        let bytes = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        let mut handle = spawn_event_pump("test", bytes, LineClassifier);
        let mut events = Vec::new();
        while let Some(event) = handle.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn text_and_tool_call_keep_order() {
        let events = collect(vec![
            "data: The door creaks\n\n",
            "data: tool:1:roll_dice\n\ndata: arg:1:{\"expr\n",
            "\ndata: arg:1:ession\":\"1d20\"}\n\n",
            "data:  open.\n\ndata: end:1\n\ndata: done\n\n",
        ])
        .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], StreamEvent::Delta("The door creaks".into()));
        assert_eq!(events[1], StreamEvent::Delta(" open.".into()));
        match &events[2] {
            StreamEvent::ToolCall(call) => {
                assert_eq!(call.name, "roll_dice");
                assert_eq!(call.arguments, serde_json::json!({"expression": "1d20"}));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(events[3], StreamEvent::Completed);
    }

    #[tokio::test]
    async fn malformed_call_is_dropped_and_stream_continues() {
        let events = collect(vec![
            "data: tool:0:get_map\n\ndata: arg:0:{\"x\":\n\ndata: end:0\n\n",
            "data: still here\n\ndata: done\n\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("still here".into()),
                StreamEvent::Completed
            ]
        );
    }

    #[tokio::test]
    async fn body_without_end_marker_still_completes() {
        let events = collect(vec!["data: tool:0:roll_dice\n\n", "data: partial"]).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Delta("partial".into()));
        assert!(matches!(events[1], StreamEvent::ToolCall(_)));
        assert_eq!(events[2], StreamEvent::Completed);
    }

    #[tokio::test]
    async fn read_error_ends_with_error_event() {
        let bytes = stream::iter(vec![
            Ok(b"data: hello\n\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let mut handle = spawn_event_pump("test", bytes, LineClassifier);
        assert_eq!(handle.next().await, Some(StreamEvent::Delta("hello".into())));
        match handle.next().await {
            Some(StreamEvent::Error(message)) => assert!(message.contains("connection reset")),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn stateful_classifier_runs_on_owned_chunks_and_reports_failure() {
        let bytes = stream::iter(vec![
            Ok(bytes_of("data: north\n\ndata: south\n\n")),
            Err(String::from("socket closed")),
        ]);
        let classifier = CountingClassifier {
            seen: std::cell::Cell::new(0),
        };
        let mut handle = spawn_event_pump("test", bytes, classifier);
        assert_eq!(handle.next().await, Some(StreamEvent::Delta("1:north".into())));
        assert_eq!(handle.next().await, Some(StreamEvent::Delta("2:south".into())));
        match handle.next().await {
            Some(StreamEvent::Error(message)) => assert!(message.contains("socket closed")),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(handle.next().await, None);
    }

    fn bytes_of(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }
}
