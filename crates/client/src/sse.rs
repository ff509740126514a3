//! `text/event-stream` framing.
//!
//! The chat stream is a sequence of `data:` payloads separated by blank
//! lines. Network chunks may split anywhere, including inside a multi-byte
//! UTF-8 sequence, so bytes are buffered and only complete lines are decoded.

/// Incremental SSE decoder. Feed it raw body chunks; it returns every
/// payload completed by that chunk.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: String,
    has_data: bool,
    bom_checked: bool,
}

const BOM: &[u8] = b"\xEF\xBB\xBF";

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every payload it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        if !self.bom_checked {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            self.bom_checked = true;
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len());
            }
        }

        let mut payloads = Vec::new();
        let mut start = 0usize;

        while let Some(rel) = self.buffer[start..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        {
            let pos = start + rel;
            let next = if self.buffer[pos] == b'\n' {
                pos + 1
            } else if pos + 1 < self.buffer.len() {
                if self.buffer[pos + 1] == b'\n' {
                    pos + 2
                } else {
                    pos + 1
                }
            } else {
                // Lone CR at the end: wait to see whether LF follows
                break;
            };

            let line = String::from_utf8_lossy(&self.buffer[start..pos]).into_owned();
            start = next;

            if line.is_empty() {
                if let Some(payload) = self.dispatch() {
                    payloads.push(payload);
                }
            } else {
                self.process_line(&line);
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        payloads
    }

    /// End of body: process a trailing unterminated line and emit any
    /// payload still pending.
    pub fn flush(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.process_line(line);
            }
        }
        self.dispatch()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_data
    }

    fn process_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // `event:`, `id:` and `retry:` carry nothing this client uses
        if field == "data" {
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value);
            self.has_data = true;
        }
    }

    fn dispatch(&mut self) -> Option<String> {
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(std::mem::take(&mut self.data))
    }
}
