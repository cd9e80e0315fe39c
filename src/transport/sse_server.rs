//! Server side of the legacy SSE transport.
//!
//! An axum app with two routes: `GET /sse` opens a per-client event stream
//! whose first event is `endpoint` (naming the POST target with a fresh
//! session id), and `POST /message?sessionId=…` carries client messages
//! upstream. Each connected client surfaces as one [`SseServerTransport`]
//! through [`SseServer::accept`], to be bound to its own server session.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{ Arc, Mutex as StdMutex };
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{ Query, State };
use axum::http::StatusCode;
use axum::response::sse::{ Event, KeepAlive, Sse };
use axum::response::IntoResponse;
use axum::routing::{ get, post };
use axum::Router;
use futures::Stream;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{ Any, CorsLayer };
use tracing::{ debug, info, warn };
use uuid::Uuid;

use crate::errors::Error;
use crate::protocol::messages::JSONRPCMessage;
use crate::transport::{
    decode_message,
    CallbackSlots,
    CloseCallback,
    ErrorCallback,
    MessageCallback,
    SendOptions,
    Transport,
};

/// Configuration for the SSE server.
#[derive(Clone, Debug)]
pub struct SseServerOptions {
    /// Address to bind to.
    pub bind_address: String,
    /// Interval between keep-alive comments on each stream.
    pub keep_alive_interval: Duration,
}

impl Default for SseServerOptions {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8090".to_string(),
            keep_alive_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
struct ClientHandle {
    outbound: mpsc::Sender<JSONRPCMessage>,
    callbacks: Arc<CallbackSlots>,
}

struct SseServerState {
    clients: StdMutex<HashMap<String, ClientHandle>>,
    accept_tx: mpsc::Sender<SseServerTransport>,
    keep_alive_interval: Duration,
}

/// The listening half: owns the axum task and yields one transport per
/// connected client.
pub struct SseServer {
    state: Arc<SseServerState>,
    local_addr: SocketAddr,
    accept_rx: tokio::sync::Mutex<mpsc::Receiver<SseServerTransport>>,
    server_task: JoinHandle<()>,
}

impl SseServer {
    /// Bind and start serving.
    pub async fn bind(options: SseServerOptions) -> Result<Self, Error> {
        let listener = TcpListener::bind(&options.bind_address).await.map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;

        let (accept_tx, accept_rx) = mpsc::channel(16);
        let state = Arc::new(SseServerState {
            clients: StdMutex::new(HashMap::new()),
            accept_tx,
            keep_alive_interval: options.keep_alive_interval,
        });

        let app = Router::new()
            .route("/sse", get(handle_sse))
            .route("/message", post(handle_message))
            .with_state(state.clone())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("SSE server error: {}", e);
            }
        });

        info!("SSE server listening on {}", local_addr);
        Ok(Self {
            state,
            local_addr,
            accept_rx: tokio::sync::Mutex::new(accept_rx),
            server_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The URL clients connect their SSE transport to.
    pub fn sse_url(&self) -> String {
        format!("http://{}/sse", self.local_addr)
    }

    /// Wait for the next client connection. `None` once the server shut
    /// down.
    pub async fn accept(&self) -> Option<SseServerTransport> {
        self.accept_rx.lock().await.recv().await
    }

    /// Stop listening and drop every connected client.
    pub fn shutdown(&self) {
        self.server_task.abort();
        let clients: Vec<ClientHandle> = {
            let mut guard = self.state.clients.lock().unwrap();
            guard.drain().map(|(_, handle)| handle).collect()
        };
        for handle in clients {
            handle.callbacks.emit_close();
        }
    }
}

impl Drop for SseServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

/// Removes the client on stream drop so an abrupt disconnect still emits
/// the close event.
struct ClientDisconnectGuard {
    state: Arc<SseServerState>,
    session_id: String,
}

impl Drop for ClientDisconnectGuard {
    fn drop(&mut self) {
        let handle = self.state.clients.lock().unwrap().remove(&self.session_id);
        if let Some(handle) = handle {
            debug!("SSE client {} disconnected", self.session_id);
            handle.callbacks.emit_close();
        }
    }
}

async fn handle_sse(
    State(state): State<Arc<SseServerState>>
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<JSONRPCMessage>(64);
    let callbacks = CallbackSlots::new();

    state.clients.lock().unwrap().insert(session_id.clone(), ClientHandle {
        outbound: outbound_tx.clone(),
        callbacks: callbacks.clone(),
    });
    debug!("SSE client {} connected", session_id);

    let transport = SseServerTransport {
        session_id: session_id.clone(),
        state: state.clone(),
        outbound: Some(outbound_tx),
        callbacks,
        started: false,
        closed: false,
    };
    if state.accept_tx.send(transport).await.is_err() {
        warn!("no acceptor for SSE client {}", session_id);
        state.clients.lock().unwrap().remove(&session_id);
    }

    let endpoint = format!("/message?sessionId={}", session_id);
    let keep_alive_interval = state.keep_alive_interval;
    let guard = ClientDisconnectGuard { state, session_id };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok(Event::default().event("endpoint").data(endpoint));
        while let Some(message) = outbound_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(e) => warn!("failed to serialize outbound message: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new().interval(keep_alive_interval).text("keep-alive")
    )
}

async fn handle_message(
    State(state): State<Arc<SseServerState>>,
    Query(params): Query<HashMap<String, String>>,
    body: String
) -> impl IntoResponse {
    let session_id = match params.get("sessionId") {
        Some(session_id) => session_id,
        None => {
            return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
        }
    };

    let handle = state.clients.lock().unwrap().get(session_id).cloned();
    let handle = match handle {
        Some(handle) => handle,
        None => {
            return (StatusCode::NOT_FOUND, "unknown session").into_response();
        }
    };

    match decode_message(&body) {
        Ok(message) => {
            handle.callbacks.emit_message(message);
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            warn!("invalid message from SSE client {}: {}", session_id, e);
            handle.callbacks.emit_error(&e);
            (StatusCode::BAD_REQUEST, "invalid message").into_response()
        }
    }
}

/// One connected SSE client, from the server's point of view.
///
/// The connection is already live when this transport is handed out;
/// messages that arrive before a session attaches its callbacks are
/// dropped, so bind the session promptly after `accept`.
pub struct SseServerTransport {
    session_id: String,
    state: Arc<SseServerState>,
    outbound: Option<mpsc::Sender<JSONRPCMessage>>,
    callbacks: Arc<CallbackSlots>,
    started: bool,
    closed: bool,
}

impl SseServerTransport {
    /// The session id baked into this client's endpoint URL.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl Transport for SseServerTransport {
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
        if self.started {
            return Err(Error::InvalidState("transport already started".to_string()));
        }
        // The HTTP connection is already established by the time the
        // transport is handed out.
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
        if self.closed {
            return Err(Error::Disconnected);
        }

        let outbound = self.outbound.as_ref().ok_or(Error::Disconnected)?;
        outbound
            .send(message.clone()).await
            .map_err(|_| Error::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState("transport was never started".to_string()));
        }
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Dropping both senders ends the client's event stream.
        self.state.clients.lock().unwrap().remove(&self.session_id);
        self.outbound = None;

        self.callbacks.emit_close();
        debug!("SSE server transport {} closed", self.session_id);
        Ok(())
    }
}
