//! Incremental SSE stream parser
//!
//! Turns a raw byte stream into discrete frames. The parser owns all of the
//! buffering: bytes that end mid UTF-8 sequence, lines that end mid chunk,
//! and fields that end mid frame are all held until completed. A frame is
//! only ever emitted once its terminating blank line has been seen, so a
//! connection dropped mid-frame never produces a partial event.

use tracing::debug;

use crate::event::Event;

/// Output of the parser for one completed unit of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A complete event frame
    Event(Event),
    /// A comment line (leading `:`), surfaced for keepalive visibility
    Comment(String),
    /// A `retry:` field with a valid non-negative integer value, in ms
    Retry(u64),
}

/// Incremental parser state for one connection epoch
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Undecoded bytes held over when a chunk ends mid UTF-8 sequence
    bytes: Vec<u8>,
    /// Current line accumulated across chunk boundaries
    line: String,
    /// Last char of the previous chunk was CR; swallow a following LF
    pending_cr: bool,
    /// Event type for the frame being assembled
    event_type: Option<String>,
    /// Data lines accumulated for the frame being assembled
    data: Option<String>,
    /// Retry value carried by the frame being assembled
    frame_retry: Option<u64>,
    /// Retained event ID; persists across frames until the server changes it
    last_event_id: Option<String>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser seeded with the ID retained from a previous
    /// connection epoch, so events on the new connection keep carrying it
    /// until the server sends a fresh `id:` field.
    pub fn with_last_event_id(id: Option<String>) -> Self {
        Self {
            last_event_id: id,
            ..Self::default()
        }
    }

    /// The currently retained event ID
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feed a chunk of raw bytes, returning every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.bytes.extend_from_slice(chunk);
        let text = self.take_decodable();

        let mut frames = Vec::new();
        for ch in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if ch == '\n' {
                    continue;
                }
            }
            match ch {
                '\r' => {
                    self.pending_cr = true;
                    self.complete_line(&mut frames);
                }
                '\n' => self.complete_line(&mut frames),
                _ => self.line.push(ch),
            }
        }
        frames
    }

    /// Signal end of stream. Any pending partial frame is discarded; an
    /// unterminated frame at disconnect is never delivered.
    pub fn end_of_stream(&mut self) {
        if self.data.is_some() || self.event_type.is_some() || !self.line.is_empty() {
            debug!("discarding partial frame at end of stream");
        }
        self.bytes.clear();
        self.line.clear();
        self.pending_cr = false;
        self.event_type = None;
        self.data = None;
        self.frame_retry = None;
    }

    /// Split off the longest decodable UTF-8 prefix of the byte buffer,
    /// keeping an incomplete trailing sequence for the next chunk.
    fn take_decodable(&mut self) -> String {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => {
                let text = s.to_owned();
                self.bytes.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                // Valid prefix followed by a truncated sequence
                let text = String::from_utf8_lossy(&self.bytes[..e.valid_up_to()]).into_owned();
                self.bytes.drain(..e.valid_up_to());
                text
            }
            Err(_) => {
                // Invalid bytes mid-stream: substitute and move on rather
                // than stalling the connection
                debug!("replacing invalid UTF-8 sequence in stream");
                let text = String::from_utf8_lossy(&self.bytes).into_owned();
                self.bytes.clear();
                text
            }
        }
    }

    fn complete_line(&mut self, frames: &mut Vec<SseFrame>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(frame) = self.flush() {
                frames.push(frame);
            }
            return;
        }
        if let Some(comment) = line.strip_prefix(':') {
            let comment = comment.strip_prefix(' ').unwrap_or(comment);
            frames.push(SseFrame::Comment(comment.to_owned()));
            return;
        }
        self.process_field(&line, frames);
    }

    fn process_field(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        // Text before the first colon is the field name; the value loses at
        // most one leading space. A line with no colon is a field with an
        // empty value.
        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            "id" => {
                // An empty value resets the retained ID
                self.last_event_id = if value.is_empty() {
                    None
                } else {
                    Some(value.to_owned())
                };
            }
            "retry" => match value.parse::<u64>() {
                Ok(ms) => {
                    self.frame_retry = Some(ms);
                    frames.push(SseFrame::Retry(ms));
                }
                Err(_) => debug!(value, "ignoring malformed retry field"),
            },
            other => debug!(field = other, "ignoring unknown field"),
        }
    }

    /// Blank-line frame terminator. An event is emitted iff the frame
    /// accumulated data or set an event type; frames carrying only `id:`
    /// or `retry:` update retained state without notifying the handler.
    fn flush(&mut self) -> Option<SseFrame> {
        let retry = self.frame_retry.take();
        if self.data.is_none() && self.event_type.is_none() {
            return None;
        }
        let event = Event {
            event_type: self
                .event_type
                .take()
                .unwrap_or_else(|| "message".to_owned()),
            data: self.data.take().unwrap_or_default(),
            id: self.last_event_id.clone(),
            retry,
        };
        Some(SseFrame::Event(event))
    }
}
