//! Transport layer for MCP communication.
//!
//! A transport delivers discrete JSON-RPC messages in both directions. The
//! contract is callback-driven: inbound messages, errors and the close event
//! are pushed upward through subscriber slots registered before `start`.
//! All callbacks fire from the transport's single reader task, so `on_close`
//! is ordered strictly after every message read before the close.

pub mod sse;
pub mod sse_server;
pub mod stdio;
pub mod streamable_http;
pub mod websocket;

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };

use async_trait::async_trait;

use crate::errors::Error;
use crate::protocol::messages::{ JSONRPCMessage, RequestId };

/// Subscriber for inbound messages.
pub type MessageCallback = Box<dyn Fn(JSONRPCMessage) + Send + Sync>;
/// Subscriber for transport-level errors.
pub type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;
/// Subscriber for the close event.
pub type CloseCallback = Box<dyn Fn() + Send + Sync>;

/// Per-send options.
///
/// Only the Streamable HTTP transport interprets these; every other
/// transport ignores them.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Resume a broken SSE stream instead of POSTing: the transport reopens
    /// its GET channel with `Last-Event-Id` set to this token.
    pub resumption_token: Option<String>,

    /// Invoked with each received SSE event id so the caller can checkpoint
    /// its position for later resumption.
    pub on_resumption_token: Option<Arc<dyn Fn(String) + Send + Sync>>,

    /// The request id a resumed stream is replaying; responses received on
    /// that stream are re-correlated to it.
    pub related_request_id: Option<RequestId>,
}

/// Transport trait for different communication channels.
///
/// Lifecycle: `start` at most once, then any number of `send`s, then
/// `close`. `close` before `start` is an error; after that it is idempotent
/// in effect and `on_close` subscribers fire exactly once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to inbound messages. Additive; never replaces earlier
    /// subscribers.
    fn on_message(&mut self, callback: MessageCallback);

    /// Subscribe to transport errors. Additive.
    fn on_error(&mut self, callback: ErrorCallback);

    /// Subscribe to the close event. Additive.
    fn on_close(&mut self, callback: CloseCallback);

    /// Establish the I/O and spawn the background reader.
    async fn start(&mut self) -> Result<(), Error>;

    /// Send one message. Must be called between `start` and `close`;
    /// message bodies never interleave on the wire.
    async fn send(&mut self, message: &JSONRPCMessage) -> Result<(), Error> {
        self.send_with_options(message, SendOptions::default()).await
    }

    /// Send one message with transport-specific options.
    async fn send_with_options(
        &mut self,
        message: &JSONRPCMessage,
        options: SendOptions
    ) -> Result<(), Error>;

    /// Tear down the I/O and cancel the reader.
    async fn close(&mut self) -> Result<(), Error>;

    /// Record the negotiated protocol revision. Transports that carry it
    /// on the wire (Streamable HTTP's `Mcp-Protocol-Version` header)
    /// override this; the default is a no-op.
    fn set_protocol_version(&mut self, version: &str) {
        let _ = version;
    }
}

/// Shared callback registry used by the transport implementations.
///
/// Subscribers are additive and invoked in registration order. The close
/// slot latches: however many paths race to report the close, subscribers
/// run once.
#[derive(Default)]
pub(crate) struct CallbackSlots {
    message: Mutex<Vec<MessageCallback>>,
    error: Mutex<Vec<ErrorCallback>>,
    close: Mutex<Vec<CloseCallback>>,
    closed: AtomicBool,
}

impl CallbackSlots {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_message(&self, callback: MessageCallback) {
        self.message.lock().unwrap().push(callback);
    }

    pub(crate) fn push_error(&self, callback: ErrorCallback) {
        self.error.lock().unwrap().push(callback);
    }

    pub(crate) fn push_close(&self, callback: CloseCallback) {
        self.close.lock().unwrap().push(callback);
    }

    pub(crate) fn emit_message(&self, message: JSONRPCMessage) {
        for callback in self.message.lock().unwrap().iter() {
            callback(message.clone());
        }
    }

    pub(crate) fn emit_error(&self, error: &Error) {
        for callback in self.error.lock().unwrap().iter() {
            callback(error);
        }
    }

    pub(crate) fn emit_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for callback in self.close.lock().unwrap().iter() {
            callback();
        }
    }
}

/// Serialize a message to its single-object wire form.
pub(crate) fn encode_message(message: &JSONRPCMessage) -> Result<String, Error> {
    serde_json::to_string(message).map_err(Error::Json)
}

/// Decode one message from its wire form.
pub(crate) fn decode_message(text: &str) -> Result<JSONRPCMessage, Error> {
    serde_json::from_str(text).map_err(Error::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn close_subscribers_fire_exactly_once() {
        let slots = CallbackSlots::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        slots.push_close(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        slots.emit_close();
        slots.emit_close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn message_subscribers_are_additive() {
        let slots = CallbackSlots::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = count.clone();
            slots.push_message(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        slots.emit_message(JSONRPCMessage::notification("ping", None));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
