//! Newline framing for byte streams with arbitrary chunk boundaries.
//!
//! Used by the worker transport (one JSON-RPC message per line) and by the
//! SSE decoder (one field per line, events separated by blank lines). Bytes
//! are buffered until a newline arrives, so a chunk may end anywhere,
//! including inside a multi-byte UTF-8 character.

/// Accumulates bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a newline.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the
    /// trailing `\n` or `\r\n`. Any remainder stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buf[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let line = &self.buf[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            from = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Take the unterminated remainder, e.g. when the stream ends.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}
