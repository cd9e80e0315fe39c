//! Engine tests over in-memory transport pairs.
//!
//! Two engines talk through a duplex pipe framed by the stdio transport;
//! the "raw" variants drive one side with hand-written bytes to observe
//! exactly what crosses the wire.

use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex as StdMutex };
use std::time::Duration;

use serde_json::json;
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf };

use super::capabilities::ClientCapabilityGate;
use super::messages::{ JSONRPCMessage, RequestId };
use super::*;
use crate::transport::stdio::StdioTransport;
use crate::transport::{
    CallbackSlots,
    CloseCallback,
    ErrorCallback,
    MessageCallback,
    SendOptions,
    Transport,
};
use crate::types::{ ClientCapabilities, ServerCapabilities };

fn engine_pair_transports() -> (StdioTransport, StdioTransport) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (StdioTransport::new(a_read, a_write), StdioTransport::new(b_read, b_write))
}

fn engine_and_raw() -> (StdioTransport, BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (StdioTransport::new(a_read, a_write), BufReader::new(b_read), b_write)
}

async fn connected_pair() -> (Protocol, Protocol) {
    let (ta, tb) = engine_pair_transports();
    let a = Protocol::new(ProtocolOptions::default());
    let b = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(ta)).await.unwrap();
    b.connect(Box::new(tb)).await.unwrap();
    (a, b)
}

async fn read_message(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> JSONRPCMessage {
    let mut line = String::new();
    tokio::time
        ::timeout(Duration::from_secs(5), reader.read_line(&mut line)).await
        .expect("timed out reading line")
        .expect("read failed");
    serde_json::from_str(&line).expect("line is not a JSON-RPC message")
}

async fn write_message(writer: &mut WriteHalf<DuplexStream>, message: &JSONRPCMessage) {
    let mut json = serde_json::to_string(message).unwrap();
    json.push('\n');
    writer.write_all(json.as_bytes()).await.unwrap();
}

/// Transport that records sends without any I/O, for asserting that a call
/// produced no wire traffic.
struct RecordingTransport {
    sent: Arc<StdMutex<Vec<JSONRPCMessage>>>,
    callbacks: Arc<CallbackSlots>,
    started: bool,
}

impl RecordingTransport {
    fn new() -> (Self, Arc<StdMutex<Vec<JSONRPCMessage>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        (
            Self {
                sent: sent.clone(),
                callbacks: CallbackSlots::new(),
                started: false,
            },
            sent,
        )
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    fn on_message(&mut self, callback: MessageCallback) {
        self.callbacks.push_message(callback);
    }

    fn on_error(&mut self, callback: ErrorCallback) {
        self.callbacks.push_error(callback);
    }

    fn on_close(&mut self, callback: CloseCallback) {
        self.callbacks.push_close(callback);
    }

    async fn start(&mut self) -> Result<(), Error> {
        self.started = true;
        Ok(())
    }

    async fn send_with_options(
        &mut self,
        message: &JSONRPCMessage,
        _options: SendOptions
    ) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState("transport not started".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.callbacks.emit_close();
        Ok(())
    }
}

#[tokio::test]
async fn request_response_round_trip() {
    let (a, b) = connected_pair().await;

    b.set_request_handler("echo", |params, _context| {
        Box::pin(async move { Ok(params.unwrap_or(json!({}))) })
    });

    let result = a
        .request("echo", Some(json!({ "value": 42 })), RequestOptions::default()).await
        .unwrap();
    assert_eq!(result["value"], 42);

    // Exactly one outcome: the record is gone afterwards.
    assert!(a.core.pending.lock().unwrap().is_empty());
}

#[tokio::test]
async fn default_ping_handler_answers() {
    let (a, _b) = connected_pair().await;
    let result = a.request(methods::PING, None, RequestOptions::default()).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let (a, _b) = connected_pair().await;

    let error = a.request("no/such/method", None, RequestOptions::default()).await.unwrap_err();
    match error {
        Error::Protocol { code, .. } => assert_eq!(code, crate::errors::ErrorCode::MethodNotFound),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn handler_protocol_error_passes_through() {
    let (a, b) = connected_pair().await;

    b.set_request_handler("fail", |_params, _context| {
        Box::pin(async { Err(Error::application(-32001, "backend unavailable")) })
    });

    let error = a.request("fail", None, RequestOptions::default()).await.unwrap_err();
    match error {
        Error::Protocol { code, message, .. } => {
            assert_eq!(code.code(), -32001);
            assert_eq!(message, "backend unavailable");
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn handler_panic_free_internal_error() {
    let (a, b) = connected_pair().await;

    b.set_request_handler("io", |_params, _context| {
        Box::pin(async {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")))
        })
    });

    let errors_seen = Arc::new(AtomicUsize::new(0));
    let counter = errors_seen.clone();
    b.on_error(move |_error| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let error = a.request("io", None, RequestOptions::default()).await.unwrap_err();
    match error {
        Error::Protocol { code, .. } => {
            assert_eq!(code, crate::errors::ErrorCode::InternalError);
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
    // The handler failure was also reported locally on the serving side.
    assert_eq!(errors_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_relays_before_final_result() {
    let (a, b) = connected_pair().await;

    b.set_request_handler("work", |_params, context| {
        Box::pin(async move {
            for _ in 0..2 {
                context.send_progress(Progress {
                    progress: 50.0,
                    total: Some(100.0),
                    message: None,
                }).await?;
            }
            Ok(json!({ "done": true }))
        })
    });

    let updates: Arc<StdMutex<Vec<(f64, Option<f64>)>>> = Arc::new(StdMutex::new(Vec::new()));
    let sink = updates.clone();
    let options = RequestOptions {
        on_progress: Some(
            Arc::new(move |progress: Progress| {
                sink.lock().unwrap().push((progress.progress, progress.total));
            })
        ),
        ..Default::default()
    };

    let result = a.request("work", None, options).await.unwrap();
    assert_eq!(result["done"], true);

    let seen = updates.lock().unwrap().clone();
    assert_eq!(seen, vec![(50.0, Some(100.0)), (50.0, Some(100.0))]);

    // The token mapping is cleaned up with the request.
    assert!(a.core.progress_entries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_sends_courtesy_cancellation() {
    let (transport, mut raw_reader, _raw_writer) = engine_and_raw();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    let caller = tokio::spawn({
        let a = a.clone();
        async move {
            a.request("slow", None, RequestOptions {
                timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            }).await
        }
    });

    // The request goes out and is never answered.
    let request = match read_message(&mut raw_reader).await {
        JSONRPCMessage::Request(request) => request,
        other => panic!("expected request, got {:?}", other),
    };
    assert_eq!(request.method, "slow");

    let error = caller.await.unwrap().unwrap_err();
    assert!(matches!(error, Error::RequestTimeout));

    // The peer is told, best effort, with the same id and reason "timeout".
    match read_message(&mut raw_reader).await {
        JSONRPCMessage::Notification(notification) => {
            assert_eq!(notification.method, methods::NOTIFICATION_CANCELLED);
            let params = notification.params.unwrap();
            assert_eq!(params["requestId"], json!(request.id));
            assert_eq!(params["reason"], "timeout");
        }
        other => panic!("expected cancellation, got {:?}", other),
    }

    assert!(a.core.pending.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_token_cancels_with_reason() {
    let (transport, mut raw_reader, _raw_writer) = engine_and_raw();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    let cancel = CancelToken::new();
    let caller = tokio::spawn({
        let a = a.clone();
        let cancel = cancel.clone();
        async move {
            a.request("slow", None, RequestOptions {
                cancel: Some(cancel),
                ..Default::default()
            }).await
        }
    });

    let request = match read_message(&mut raw_reader).await {
        JSONRPCMessage::Request(request) => request,
        other => panic!("expected request, got {:?}", other),
    };

    cancel.cancel();
    let error = caller.await.unwrap().unwrap_err();
    assert!(matches!(error, Error::Cancelled));

    match read_message(&mut raw_reader).await {
        JSONRPCMessage::Notification(notification) => {
            assert_eq!(notification.method, methods::NOTIFICATION_CANCELLED);
            let params = notification.params.unwrap();
            assert_eq!(params["requestId"], json!(request.id));
            assert_eq!(params["reason"], "cancelled");
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_response_id_is_dropped() {
    let (transport, mut raw_reader, mut raw_writer) = engine_and_raw();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    // A response nobody asked for: dropped without completing anything.
    write_message(
        &mut raw_writer,
        &JSONRPCMessage::response(RequestId::Number(999), json!({ "ghost": true }))
    ).await;

    // The engine is still fully operational afterwards.
    let caller = tokio::spawn({
        let a = a.clone();
        async move { a.request("echo", None, RequestOptions::default()).await }
    });
    let request = match read_message(&mut raw_reader).await {
        JSONRPCMessage::Request(request) => request,
        other => panic!("expected request, got {:?}", other),
    };
    write_message(&mut raw_writer, &JSONRPCMessage::response(request.id, json!({ "ok": 1 }))).await;

    let result = caller.await.unwrap().unwrap();
    assert_eq!(result["ok"], 1);
}

#[tokio::test]
async fn disconnect_fails_every_pending_request() {
    let (transport, mut raw_reader, raw_writer) = engine_and_raw();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();
    a.on_close(move || {
        flag.store(true, Ordering::SeqCst);
    });

    let first = tokio::spawn({
        let a = a.clone();
        async move { a.request("one", None, RequestOptions::default()).await }
    });
    let second = tokio::spawn({
        let a = a.clone();
        async move { a.request("two", None, RequestOptions::default()).await }
    });

    // Both requests reach the wire, then the peer goes away entirely.
    let _ = read_message(&mut raw_reader).await;
    let _ = read_message(&mut raw_reader).await;
    drop(raw_reader);
    drop(raw_writer);

    assert!(matches!(first.await.unwrap(), Err(Error::Disconnected)));
    assert!(matches!(second.await.unwrap(), Err(Error::Disconnected)));
    assert!(closed.load(Ordering::SeqCst));
    assert!(!a.is_connected());
}

#[tokio::test]
async fn peer_cancellation_aborts_handler_without_reply() {
    let (a, b) = connected_pair().await;

    let completed = Arc::new(AtomicBool::new(false));
    let flag = completed.clone();
    b.set_request_handler("slow", move |_params, _context| {
        let flag = flag.clone();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(json!({}))
        })
    });

    let cancel = CancelToken::new();
    let caller = tokio::spawn({
        let a = a.clone();
        let cancel = cancel.clone();
        async move {
            a.request("slow", None, RequestOptions {
                cancel: Some(cancel),
                ..Default::default()
            }).await
        }
    });

    // Give the request time to reach the handler, then cancel.
    tokio::time::timeout(Duration::from_secs(5), async {
        while b.core.inflight.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }).await.expect("handler never started");

    cancel.cancel();
    assert!(matches!(caller.await.unwrap(), Err(Error::Cancelled)));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !b.core.inflight.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }).await.expect("handler task was not aborted");

    assert!(!completed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn progress_resets_the_deadline_when_asked() {
    let (a, b) = connected_pair().await;

    b.set_request_handler("trickle", |_params, context| {
        Box::pin(async move {
            // Longer than the timeout overall, but never silent for longer
            // than one timeout interval.
            for step in 0..3u8 {
                tokio::time::sleep(Duration::from_millis(150)).await;
                context.send_progress(Progress {
                    progress: f64::from(step),
                    total: Some(3.0),
                    message: None,
                }).await?;
            }
            Ok(json!({ "done": true }))
        })
    });

    let options = RequestOptions {
        timeout: Some(Duration::from_millis(250)),
        reset_timeout_on_progress: Some(true),
        on_progress: Some(Arc::new(|_progress| {})),
        ..Default::default()
    };
    let result = a.request("trickle", None, options).await.unwrap();
    assert_eq!(result["done"], true);
}

#[tokio::test]
async fn capability_gate_blocks_before_any_io() {
    let (transport, sent) = RecordingTransport::new();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    // The gate of a client whose server declared nothing at all.
    a.set_capability_gate(
        Arc::new(ClientCapabilityGate {
            server: ServerCapabilities::default(),
            client: ClientCapabilities::default(),
        })
    );

    let error = a
        .request(methods::TOOLS_LIST, None, RequestOptions::default()).await
        .unwrap_err();
    assert!(matches!(error, Error::Capability(_)));

    let error = a.notify(methods::NOTIFICATION_ROOTS_LIST_CHANGED, None).await.unwrap_err();
    assert!(matches!(error, Error::Capability(_)));

    // Nothing was written to the transport.
    assert!(sent.lock().unwrap().is_empty());

    // With enforcement off the same calls hit the wire.
    let (transport, sent) = RecordingTransport::new();
    let lax = Protocol::new(ProtocolOptions {
        enforce_capabilities: false,
        ..Default::default()
    });
    lax.connect(Box::new(transport)).await.unwrap();
    lax.set_capability_gate(
        Arc::new(ClientCapabilityGate {
            server: ServerCapabilities::default(),
            client: ClientCapabilities::default(),
        })
    );
    lax.notify(methods::NOTIFICATION_ROOTS_LIST_CHANGED, None).await.unwrap();
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_sends_never_interleave() {
    let (transport, mut raw_reader, _raw_writer) = engine_and_raw();
    let a = Protocol::new(ProtocolOptions::default());
    a.connect(Box::new(transport)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let a = a.clone();
        tasks.push(
            tokio::spawn(async move {
                a.notify("burst/event", Some(json!({ "seq": i, "pad": "x".repeat(512) }))).await
            })
        );
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Every line on the wire is one complete message.
    let mut seen = 0;
    while seen < 20 {
        match read_message(&mut raw_reader).await {
            JSONRPCMessage::Notification(notification) => {
                assert_eq!(notification.method, "burst/event");
                seen += 1;
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn close_is_observable_and_idempotent() {
    let (a, b) = connected_pair().await;

    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    a.on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    a.close().await.unwrap();
    a.close().await.unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!a.is_connected());
    drop(b);
}
