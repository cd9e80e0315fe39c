//! Incremental Server-Sent Events framing.
//!
//! The Streamable HTTP transport receives SSE over a plain byte stream
//! (a POST response body or a GET channel), so the decoder here accepts
//! arbitrary chunks and emits events at blank-line boundaries. The encoder
//! half produces the `event:`/`data:`/`id:` form the SSE server transport
//! writes downstream.

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `id:` field, retained by clients for resumption.
    pub id: Option<String>,
    /// The `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// The joined `data:` lines.
    pub data: String,
}

impl SseEvent {
    /// A `message` event carrying one JSON-RPC payload.
    pub fn message<D: Into<String>>(data: D, id: Option<String>) -> Self {
        Self { id, event: Some("message".to_string()), data: data.into() }
    }

    /// Render the wire form, terminated by the blank line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Streaming SSE decoder.
///
/// Feed it chunks as they arrive; it returns every event completed by the
/// chunk and keeps the unfinished tail buffered. The last seen event id is
/// retained across events as the resumption checkpoint.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    id: Option<String>,
    data_lines: Vec<String>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the most recently dispatched event, if any carried one.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Consume a chunk of bytes, returning the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment line.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() && self.event.is_none() {
            self.id = None;
            return None;
        }

        let event = SseEvent {
            id: self.id.take(),
            event: self.event.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        };
        if let Some(id) = &event.id {
            self.last_event_id = Some(id.clone());
        }
        Some(event)
    }
}
