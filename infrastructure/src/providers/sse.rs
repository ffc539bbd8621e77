//! Incremental server-sent events decoding.
//!
//! Bytes are buffered until a newline, then split into fields; a blank line
//! dispatches the accumulated event. Chunk boundaries may fall anywhere,
//! including inside a field name or a UTF-8 character.

use crate::framing::LineBuffer;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.lines
            .push(chunk)
            .into_iter()
            .filter_map(|line| self.apply_line(&line))
            .collect()
    }

    /// Flush at end of stream: an unterminated last line and any event that
    /// was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if let Some(rest) = self.lines.take_remainder() {
            self.apply_line(&rest);
        }
        self.dispatch()
    }

    fn apply_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
