//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; complete lines are decoded as they
//! become available and an event is dispatched on every blank line.

const BOM: char = '\u{FEFF}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `message` when the frame had no `event:` field.
    pub event: String,
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    skip_lf: bool,
    started: bool,
    event: String,
    data: String,
    last_event_id: String,
    retry_ms: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            if self.skip_lf {
                match self.buffer.first() {
                    Some(b'\n') => {
                        self.buffer.remove(0);
                        self.skip_lf = false;
                    }
                    Some(_) => self.skip_lf = false,
                    None => break,
                }
            }
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                break;
            };
            // A CR ends the line at once; an LF right after it, even in the
            // next chunk, belongs to the same line break.
            self.skip_lf = self.buffer[pos] == b'\r';
            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Reconnection delay requested by the server, in milliseconds.
    pub fn retry_ms(&self) -> Option<u64> {
        self.retry_ms
    }

    pub fn last_event_id(&self) -> Option<&str> {
        if self.last_event_id.is_empty() {
            None
        } else {
            Some(&self.last_event_id)
        }
    }

    /// Drops any partially received frame, keeping the last event id.
    pub fn reset_frame(&mut self) {
        self.buffer.clear();
        self.skip_lf = false;
        self.started = false;
        self.event.clear();
        self.data.clear();
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = if self.started {
            line
        } else {
            self.started = true;
            line.strip_prefix(BOM).unwrap_or(line)
        };

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
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = value.to_string(),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                self.retry_ms = value.parse().ok();
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        data.pop();
        Some(SseEvent {
            event: if event.is_empty() {
                "message".to_string()
            } else {
                event
            },
            data,
            id: self.last_event_id().map(ToOwned::to_owned),
        })
    }
}
