//! Reassembly of tool calls whose arguments arrive in fragments.
//!
//! Fragments are keyed by the call's position in the stream, not by id:
//! some vendors only reveal the id in the start event, and others never do.
//! Arguments are parsed exactly once, when the call ends.

use super::event::{StreamEvent, StreamSignal};
use crate::conversation::message::{ToolInvocation, local_call_id, parse_arguments};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single tool call in a stream could not be reconstructed.
///
/// The call is dropped; the rest of the stream is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tool call #{index} could not be decoded: {reason}")]
pub struct StreamDecodeError {
    pub index: usize,
    pub reason: String,
}

impl StreamDecodeError {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-stream accumulator for tool calls.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of the call at `index`.
    ///
    /// Vendors that repeat the start for an index only fill in what is missing.
    pub fn start(&mut self, index: usize, id: Option<String>, name: String) {
        let call = self.calls.entry(index).or_default();
        if call.id.is_none() {
            call.id = id;
        }
        if call.name.is_none() && !name.is_empty() {
            call.name = Some(name);
        }
    }

    pub fn push_fragment(&mut self, index: usize, fragment: &str) {
        self.calls
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Close the call at `index` and parse its accumulated arguments.
    ///
    /// Returns `None` when nothing was recorded for `index` (for example the
    /// end of a text block).
    pub fn finish(&mut self, index: usize) -> Option<Result<ToolInvocation, StreamDecodeError>> {
        let call = self.calls.remove(&index)?;
        Some(Self::build(index, call))
    }

    /// Close every open call in index order.
    pub fn finish_all(&mut self) -> Vec<Result<ToolInvocation, StreamDecodeError>> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| Self::build(index, call))
            .collect()
    }

    pub fn has_open_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Apply one classified signal, producing the neutral events it completes.
    ///
    /// Text deltas pass through untouched and in order. A stream end closes
    /// any calls the vendor left open before emitting [`StreamEvent::Completed`].
    pub fn apply(&mut self, signal: StreamSignal) -> Vec<Result<StreamEvent, StreamDecodeError>> {
        match signal {
            StreamSignal::TextDelta(text) if text.is_empty() => Vec::new(),
            StreamSignal::TextDelta(text) => vec![Ok(StreamEvent::Delta(text))],
            StreamSignal::ToolCallStart { index, id, name } => {
                self.start(index, id, name);
                Vec::new()
            }
            StreamSignal::ToolCallArgumentFragment { index, fragment } => {
                self.push_fragment(index, &fragment);
                Vec::new()
            }
            StreamSignal::ToolCallEnd { index } => self
                .finish(index)
                .map(|r| r.map(StreamEvent::ToolCall))
                .into_iter()
                .collect(),
            StreamSignal::StreamEnd => {
                let mut events: Vec<_> = self
                    .finish_all()
                    .into_iter()
                    .map(|r| r.map(StreamEvent::ToolCall))
                    .collect();
                events.push(Ok(StreamEvent::Completed));
                events
            }
            StreamSignal::Error(message) => vec![Ok(StreamEvent::Error(message))],
            StreamSignal::Ignorable => Vec::new(),
        }
    }

    fn build(index: usize, call: PartialCall) -> Result<ToolInvocation, StreamDecodeError> {
        let name = call
            .name
            .ok_or_else(|| StreamDecodeError::new(index, "missing tool name"))?;
        let arguments = parse_arguments(&call.arguments)
            .map_err(|e| StreamDecodeError::new(index, format!("{}: {}", name, e)))?;
        Ok(ToolInvocation {
            id: call.id.unwrap_or_else(local_call_id),
            name,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(assembler: &mut ToolCallAssembler, signals: Vec<StreamSignal>) -> Vec<StreamEvent> {
        signals
            .into_iter()
            .flat_map(|s| assembler.apply(s))
            .filter_map(Result::ok)
            .collect()
    }

    #[test]
    fn three_fragments_parse_as_one_value_and_text_keeps_order() {
        let mut assembler = ToolCallAssembler::new();
        let events = drain(
            &mut assembler,
            vec![
                StreamSignal::TextDelta("You swing ".into()),
                StreamSignal::ToolCallStart {
                    index: 1,
                    id: Some("toolu_01".into()),
                    name: "attack".into(),
                },
                StreamSignal::ToolCallArgumentFragment {
                    index: 1,
                    fragment: "{\"target\":".into(),
                },
                StreamSignal::TextDelta("your sword".into()),
                StreamSignal::ToolCallArgumentFragment {
                    index: 1,
                    fragment: "\"goblin\",\"wea".into(),
                },
                StreamSignal::ToolCallArgumentFragment {
                    index: 1,
                    fragment: "pon\":\"longsword\"}".into(),
                },
                StreamSignal::ToolCallEnd { index: 1 },
                StreamSignal::TextDelta("!".into()),
                StreamSignal::StreamEnd,
            ],
        );

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("You swing ".into()),
                StreamEvent::Delta("your sword".into()),
                StreamEvent::ToolCall(ToolInvocation::new(
                    "toolu_01",
                    "attack",
                    json!({"target": "goblin", "weapon": "longsword"})
                )),
                StreamEvent::Delta("!".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[test]
    fn malformed_arguments_drop_only_that_call() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(0, Some("a".into()), "roll_dice".into());
        assembler.push_fragment(0, "{\"sides\":");
        assembler.start(1, Some("b".into()), "get_inventory".into());
        assembler.push_fragment(1, "{}");

        let bad = assembler.finish(0).unwrap();
        assert_eq!(bad.unwrap_err().index, 0);
        let good = assembler.finish(1).unwrap().unwrap();
        assert_eq!(good.name, "get_inventory");
        assert!(!assembler.has_open_calls());
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(0, Some("t".into()), "get_world_state".into());
        let call = assembler.finish(0).unwrap().unwrap();
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn missing_id_gets_unique_local_id() {
        let mut assembler = ToolCallAssembler::new();
        assembler.start(0, None, "roll_dice".into());
        assembler.start(1, None, "roll_dice".into());
        let calls: Vec<_> = assembler.finish_all().into_iter().map(Result::unwrap).collect();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn fragment_without_start_is_missing_name() {
        let mut assembler = ToolCallAssembler::new();
        assembler.push_fragment(3, "{}");
        let err = assembler.finish(3).unwrap().unwrap_err();
        assert_eq!(err, StreamDecodeError::new(3, "missing tool name"));
    }

    #[test]
    fn end_for_unknown_index_is_ignored() {
        let mut assembler = ToolCallAssembler::new();
        assert!(assembler.apply(StreamSignal::ToolCallEnd { index: 0 }).is_empty());
    }

    #[test]
    fn stream_end_closes_open_calls() {
        let mut assembler = ToolCallAssembler::new();
        let events = drain(
            &mut assembler,
            vec![
                StreamSignal::ToolCallStart {
                    index: 0,
                    id: Some("call_1".into()),
                    name: "move_token".into(),
                },
                StreamSignal::ToolCallArgumentFragment {
                    index: 0,
                    fragment: "{\"x\":3}".into(),
                },
                StreamSignal::StreamEnd,
            ],
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::ToolCall(c) if c.arguments == json!({"x": 3})));
        assert_eq!(events[1], StreamEvent::Completed);
    }
}
