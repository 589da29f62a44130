//! Incremental Server-Sent Events decoding.
//!
//! Network chunks do not line up with SSE frames, so bytes are buffered until
//! a blank line terminates a frame. Frames without a `data` field (comments,
//! keep-alives) are dropped.

use tracing::{trace, warn};

use crate::error::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `message` when the frame carries no `event` field.
    pub event_type: String,
    pub data: String,
    pub id: Option<String>,
    /// Reconnect hint from the server, in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn parse(frame: &str) -> Option<Self> {
        let mut event_type = "message".to_string();
        let mut data = String::new();
        let mut has_data = false;
        let mut id = None;
        let mut retry = None;

        for line in frame.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (key, value) = match line.split_once(':') {
                Some((key, value)) => (key, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match key {
                "event" => event_type = value.to_string(),
                "data" => {
                    if has_data {
                        data.push('\n');
                    }
                    data.push_str(value);
                    has_data = true;
                }
                "id" => id = Some(value.to_string()),
                "retry" => retry = value.parse::<u64>().ok(),
                _ => trace!("unknown SSE field: {}", key),
            }
        }

        has_data.then_some(Self {
            event_type,
            data,
            id,
            retry,
        })
    }
}

/// Largest partial frame held before the stream is treated as broken.
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes already searched for a terminator without finding one.
    scanned: usize,
    max_buffered: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_BUFFERED_BYTES)
    }
}

impl SseDecoder {
    pub fn with_limit(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_buffered,
        }
    }

    /// Feed one network chunk, returning every frame it completed. Fails
    /// once an unterminated frame outgrows the limit; the buffer is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, ConnectionError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        // A terminator may straddle the previous chunk boundary.
        let mut from = self.scanned.saturating_sub(3);
        while let Some((end, separator_len)) = find_frame_end(&self.buffer, from) {
            let frame: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            let text = String::from_utf8_lossy(&frame);
            trace!("SSE frame: {}", text);
            if let Some(event) = SseEvent::parse(&text) {
                events.push(event);
            }
            from = 0;
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_buffered {
            let buffered = self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
            warn!(buffered, limit = self.max_buffered, "SSE frame too large, dropping buffer");
            return Err(ConnectionError::Stream(format!(
                "unterminated SSE frame exceeded {} bytes",
                self.max_buffered
            )));
        }
        Ok(events)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Earliest blank-line terminator at or after `from`, as
/// `(frame_len, separator_len)`.
fn find_frame_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|pos| {
        let rest = &buffer[pos..];
        if rest.starts_with(b"\n\n") {
            Some((pos, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((pos, 4))
        } else {
            None
        }
    })
}
