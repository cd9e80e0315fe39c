//! Message framing.
//!
//! Two framing modes exist: newline-delimited JSON for byte streams (stdio,
//! subprocess pipes) and Server-Sent Events for the HTTP transports. This
//! module holds the line framer; the SSE decoder lives in [`sse`].

pub mod sse;

use crate::errors::Error;
use crate::protocol::messages::JSONRPCMessage;

/// Accumulates bytes from a stream and yields newline-delimited JSON-RPC
/// messages.
///
/// A line that fails to decode is retried from its first `{`, which recovers
/// from banner noise a subprocess may print before its first message. A line
/// that still fails is reported as a framing error and dropped; the buffer
/// keeps going with the bytes after it.
#[derive(Default)]
pub struct ReadBuffer {
    buffer: Vec<u8>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk of bytes read from the underlying stream.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete message, if a full line is buffered.
    ///
    /// `Ok(None)` means more bytes are needed. `Err` reports an
    /// undecodable line; the line is consumed, so the caller can log and
    /// keep reading.
    pub fn read_message(&mut self) -> Result<Option<JSONRPCMessage>, Error> {
        loop {
            let newline = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => return Ok(None),
            };

            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<JSONRPCMessage>(text) {
                Ok(message) => return Ok(Some(message)),
                Err(first_err) => {
                    // Retry from the first '{' to skip any leading noise.
                    if let Some(start) = text.find('{') {
                        if start > 0 {
                            if let Ok(message) = serde_json::from_str::<JSONRPCMessage>(
                                &text[start..]
                            ) {
                                return Ok(Some(message));
                            }
                        }
                    }
                    return Err(Error::Framing(
                        format!("undecodable line ({}): {}", first_err, preview(text))
                    ));
                }
            }
        }
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::RequestId;

    fn encoded(id: i64) -> String {
        format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"method\":\"ping\"}}\n", id)
    }

    #[test]
    fn yields_messages_in_order_regardless_of_chunking() {
        let bytes = format!("{}{}", encoded(1), encoded(2)).into_bytes();

        // Feed the same bytes one at a time and all at once.
        for chunk_size in [1, 7, bytes.len()] {
            let mut buffer = ReadBuffer::new();
            let mut ids = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                buffer.append(chunk);
                while let Some(message) = buffer.read_message().unwrap() {
                    match message {
                        JSONRPCMessage::Request(req) => ids.push(req.id),
                        other => panic!("unexpected message {:?}", other),
                    }
                }
            }
            assert_eq!(ids, vec![RequestId::Number(1), RequestId::Number(2)]);
        }
    }

    #[test]
    fn tolerates_crlf() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\r\n");
        assert!(matches!(
            buffer.read_message().unwrap(),
            Some(JSONRPCMessage::Notification(_))
        ));
    }

    #[test]
    fn recovers_from_leading_garbage() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"server v1.2 ready {\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n");
        assert!(matches!(
            buffer.read_message().unwrap(),
            Some(JSONRPCMessage::Request(_))
        ));
    }

    #[test]
    fn garbage_line_is_dropped_and_stream_survives() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"garbage\n");
        buffer.append(encoded(3).as_bytes());

        assert!(buffer.read_message().is_err());
        match buffer.read_message().unwrap() {
            Some(JSONRPCMessage::Request(req)) => assert_eq!(req.id, RequestId::Number(3)),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn partial_line_waits_for_more_bytes() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"{\"jsonrpc\":\"2.0\"");
        assert!(buffer.read_message().unwrap().is_none());
    }
}
