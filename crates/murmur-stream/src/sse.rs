//! Incremental Server-Sent Events framing.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences split across network chunks are reassembled before decoding.
//! Frames are dispatched on a blank line.

use bytes::BytesMut;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the network.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        while let Some(line_end) = find_newline(&self.buf) {
            let raw = self.buf.split_to(line_end);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    return Some(frame);
                }
                continue;
            }

            // Comment / keep-alive.
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                },
                // `id` and `retry` only matter to reconnecting clients.
                _ => {}
            }
        }
        None
    }

    /// Whether bytes or fields of an unfinished frame are pending.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty() || self.event.is_some() || self.data.is_some()
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take();
        if event.is_none() && data.is_none() {
            return None;
        }
        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: data.unwrap_or_default(),
        })
    }
}

fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}
