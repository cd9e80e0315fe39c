//! Streamable HTTP client transport.
//!
//! One URL, several reply shapes: a POST may come back empty (202), as one
//! inline JSON message, or as an inline SSE stream; after the client's
//! `notifications/initialized` the transport additionally opens a GET SSE
//! channel for server-initiated messages (a 405 means the server declines,
//! which is fine). The server may hand out an `Mcp-Session-Id` that is
//! echoed on every later request and released with a DELETE on close, and a
//! broken stream can be resumed with `Last-Event-Id`.

use std::sync::{ Arc, Mutex as StdMutex, RwLock as StdRwLock };
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header;
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tracing::{ debug, warn };
use url::Url;

use crate::errors::Error;
use crate::framing::sse::SseDecoder;
use crate::protocol::messages::{ JSONRPCMessage, RequestId };
use crate::protocol::methods;
use crate::transport::{
    decode_message,
    encode_message,
    CallbackSlots,
    CloseCallback,
    ErrorCallback,
    MessageCallback,
    SendOptions,
    Transport,
};

/// Header carrying the server-assigned session identity.
pub const HEADER_SESSION_ID: &str = "Mcp-Session-Id";
/// Header carrying the negotiated protocol revision.
pub const HEADER_PROTOCOL_VERSION: &str = "Mcp-Protocol-Version";
/// Header resuming an SSE stream from a checkpoint.
pub const HEADER_LAST_EVENT_ID: &str = "Last-Event-Id";

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Options for the Streamable HTTP transport.
#[derive(Clone, Debug, Default)]
pub struct StreamableHttpOptions {
    /// Bearer token added to every request.
    pub auth_token: Option<String>,
    /// Extra headers added to every request.
    pub custom_headers: Vec<(String, String)>,
    /// Session to resume, when known from a previous connection.
    pub session_id: Option<String>,
}

/// Client transport speaking the Streamable HTTP flavor of MCP.
pub struct StreamableHttpTransport {
    url: Url,
    http: reqwest::Client,
    options: StreamableHttpOptions,
    callbacks: Arc<CallbackSlots>,
    session_id: Arc<StdRwLock<Option<String>>>,
    protocol_version: Arc<StdRwLock<Option<String>>>,
    last_event_id: Arc<StdRwLock<Option<String>>>,
    get_task: Arc<StdMutex<Option<JoinHandle<()>>>>,
    started: bool,
    closed: bool,
}

impl StreamableHttpTransport {
    pub fn new(url: &str) -> Result<Self, Error> {
        Self::with_options(url, StreamableHttpOptions::default())
    }

    pub fn with_options(url: &str, options: StreamableHttpOptions) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::Transport(format!("invalid URL: {}", e)))?;

        // No global timeout: the GET channel is expected to stay open.
        let http = reqwest::Client
            ::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        let session_id = options.session_id.clone();
        Ok(Self {
            url,
            http,
            options,
            callbacks: CallbackSlots::new(),
            session_id: Arc::new(StdRwLock::new(session_id)),
            protocol_version: Arc::new(StdRwLock::new(None)),
            last_event_id: Arc::new(StdRwLock::new(None)),
            get_task: Arc::new(StdMutex::new(None)),
            started: false,
            closed: false,
        })
    }

    /// The server-assigned session id, once one was observed.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().unwrap().clone()
    }

    /// The id of the last received SSE event, usable as a resumption token.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.read().unwrap().clone()
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(session) = self.session_id.read().unwrap().as_deref() {
            request = request.header(HEADER_SESSION_ID, session);
        }
        if let Some(version) = self.protocol_version.read().unwrap().as_deref() {
            request = request.header(HEADER_PROTOCOL_VERSION, version);
        }
        if let Some(token) = &self.options.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in &self.options.custom_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(session) = response.headers().get(HEADER_SESSION_ID) {
            if let Ok(session) = session.to_str() {
                let mut guard = self.session_id.write().unwrap();
                if guard.as_deref() != Some(session) {
                    debug!("captured session id {}", session);
                    *guard = Some(session.to_string());
                }
            }
        }
    }

    /// Open (or replace) the GET SSE channel for server-initiated messages.
    fn spawn_get_stream(&self, options: GetStreamOptions) {
        let http = self.http.clone();
        let url = self.url.clone();
        let session_id = self.session_id.clone();
        let protocol_version = self.protocol_version.clone();
        let auth_token = self.options.auth_token.clone();
        let custom_headers = self.options.custom_headers.clone();
        let callbacks = self.callbacks.clone();
        let last_event_id = self.last_event_id.clone();

        let task = tokio::spawn(async move {
            let mut request = http.get(url).header(header::ACCEPT, "text/event-stream");
            if let Some(session) = session_id.read().unwrap().as_deref() {
                request = request.header(HEADER_SESSION_ID, session);
            }
            if let Some(version) = protocol_version.read().unwrap().as_deref() {
                request = request.header(HEADER_PROTOCOL_VERSION, version);
            }
            if let Some(token) = &auth_token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            for (name, value) in &custom_headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(token) = &options.resume_from {
                request = request.header(HEADER_LAST_EVENT_ID, token.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    callbacks.emit_error(&Error::Transport(format!("GET stream failed: {}", e)));
                    return;
                }
            };

            match response.status() {
                // The server does not offer a server-initiated stream.
                StatusCode::METHOD_NOT_ALLOWED => {
                    debug!("server declined the GET SSE channel (405)");
                    return;
                }
                status if !status.is_success() => {
                    callbacks.emit_error(
                        &Error::Transport(format!("GET stream returned HTTP {}", status))
                    );
                    return;
                }
                _ => {}
            }

            consume_sse_body(
                response,
                callbacks,
                last_event_id,
                options.on_resumption_token,
                options.replay_request_id
            ).await;
        });

        let mut guard = self.get_task.lock().unwrap();
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }
}

#[derive(Default)]
struct GetStreamOptions {
    resume_from: Option<String>,
    replay_request_id: Option<RequestId>,
    on_resumption_token: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

/// Parse an SSE response body and dispatch each event until the stream
/// closes.
async fn consume_sse_body(
    response: reqwest::Response,
    callbacks: Arc<CallbackSlots>,
    last_event_id: Arc<StdRwLock<Option<String>>>,
    on_resumption_token: Option<Arc<dyn Fn(String) + Send + Sync>>,
    replay_request_id: Option<RequestId>
) {
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                callbacks.emit_error(&Error::Transport(format!("SSE stream error: {}", e)));
                return;
            }
        };

        for event in decoder.feed(&chunk) {
            if let Some(id) = &event.id {
                *last_event_id.write().unwrap() = Some(id.clone());
                if let Some(checkpoint) = &on_resumption_token {
                    checkpoint(id.clone());
                }
            }

            match event.event.as_deref() {
                None | Some("message") => {
                    match decode_message(&event.data) {
                        Ok(mut message) => {
                            // A resumed stream replays under the caller's
                            // original request id.
                            if let Some(replay_id) = &replay_request_id {
                                match &mut message {
                                    JSONRPCMessage::Response(response) => {
                                        response.id = replay_id.clone();
                                    }
                                    JSONRPCMessage::Error(error) => {
                                        error.id = Some(replay_id.clone());
                                    }
                                    _ => {}
                                }
                            }
                            callbacks.emit_message(message);
                        }
                        Err(e) => callbacks.emit_error(&e),
                    }
                }
                Some("error") => {
                    callbacks.emit_error(&Error::Transport(event.data));
                }
                Some(other) => debug!("ignoring SSE event type {}", other),
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
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
        // The first POST establishes the conversation; nothing to do yet.
        self.started = true;
        Ok(())
    }

    async fn send_with_options(
        &mut self,
        message: &JSONRPCMessage,
        options: SendOptions
    ) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState("transport not started".to_string()));
        }
        if self.closed {
            return Err(Error::Disconnected);
        }

        // Resumption replaces the POST outright: reopen the stream from the
        // checkpoint and let the replay deliver the response.
        if let Some(token) = options.resumption_token {
            self.spawn_get_stream(GetStreamOptions {
                resume_from: Some(token),
                replay_request_id: options.related_request_id,
                on_resumption_token: options.on_resumption_token,
            });
            return Ok(());
        }

        let body = encode_message(message)?;
        let request = self
            .apply_headers(self.http.post(self.url.clone()))
            .header(header::ACCEPT, ACCEPT_BOTH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);

        let response = request
            .send().await
            .map_err(|e| Error::Transport(format!("POST failed: {}", e)))?;
        self.capture_session_id(&response);

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            // Accepted without a body. After the initialized notification,
            // try to open the server-initiated stream.
            if message.method() == Some(methods::NOTIFICATION_INITIALIZED) {
                self.spawn_get_stream(GetStreamOptions {
                    on_resumption_token: options.on_resumption_token,
                    ..Default::default()
                });
            }
            return Ok(());
        }

        if !status.is_success() {
            return Err(Error::Transport(format!("server returned HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("application/json") {
            let text = response
                .text().await
                .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;
            let message = decode_message(&text)?;
            self.callbacks.emit_message(message);
        } else if content_type.starts_with("text/event-stream") {
            // The inline stream may carry the response plus notifications;
            // drain it off the send path.
            let callbacks = self.callbacks.clone();
            let last_event_id = self.last_event_id.clone();
            tokio::spawn(
                consume_sse_body(
                    response,
                    callbacks,
                    last_event_id,
                    options.on_resumption_token,
                    None
                )
            );
        } else if !content_type.is_empty() {
            warn!("unexpected content type {} on POST response", content_type);
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState("transport was never started".to_string()));
        }
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(task) = self.get_task.lock().unwrap().take() {
            task.abort();
        }

        // Release the session; 405 means the server does not track them.
        let session = self.session_id.read().unwrap().clone();
        if let Some(session) = session {
            let request = self
                .apply_headers(self.http.delete(self.url.clone()))
                .header(HEADER_SESSION_ID, session);
            match request.send().await {
                Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                    debug!("server does not support session DELETE (405)");
                }
                Ok(response) if !response.status().is_success() => {
                    warn!("session DELETE returned HTTP {}", response.status());
                }
                Ok(_) => {}
                Err(e) => warn!("session DELETE failed: {}", e),
            }
        }
        *self.session_id.write().unwrap() = None;

        self.callbacks.emit_close();
        debug!("streamable HTTP transport closed");
        Ok(())
    }

    fn set_protocol_version(&mut self, version: &str) {
        *self.protocol_version.write().unwrap() = Some(version.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ Client, ClientOptions };
    use crate::types::{
        CallToolResult,
        Content,
        Implementation,
        InitializeResult,
        ListToolsResult,
        ServerCapabilities,
        Tool,
        ToolInputSchema,
        ToolsCapability,
        LATEST_PROTOCOL_VERSION,
    };
    use axum::extract::State;
    use axum::http::header::{ HeaderName, CONTENT_TYPE };
    use axum::http::{ HeaderMap, StatusCode };
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// What the loopback server observed about each request.
    #[derive(Debug, Clone)]
    struct SeenRequest {
        method: String,
        session: Option<String>,
        protocol_version: Option<String>,
    }

    #[derive(Default)]
    struct TestState {
        invalid_initialize: bool,
        seen: StdMutex<Vec<SeenRequest>>,
    }

    fn json_reply(message: &JSONRPCMessage) -> axum::response::Response {
        (
            [(CONTENT_TYPE, "application/json")],
            serde_json::to_string(message).unwrap(),
        ).into_response()
    }

    async fn post_handler(
        State(state): State<Arc<TestState>>,
        headers: HeaderMap,
        body: String
    ) -> axum::response::Response {
        let session = headers
            .get("mcp-session-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let protocol_version = headers
            .get("mcp-protocol-version")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let message: JSONRPCMessage = match serde_json::from_str(&body) {
            Ok(message) => message,
            Err(_) => {
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let request = match message {
            JSONRPCMessage::Request(request) => request,
            // Notifications and responses are accepted without a body.
            _ => {
                return StatusCode::ACCEPTED.into_response();
            }
        };

        state.seen.lock().unwrap().push(SeenRequest {
            method: request.method.clone(),
            session,
            protocol_version,
        });

        match request.method.as_str() {
            "initialize" => {
                if state.invalid_initialize {
                    return (
                        [(CONTENT_TYPE, "application/json")],
                        "this is not valid json",
                    ).into_response();
                }
                let result = InitializeResult {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability::default()),
                        ..Default::default()
                    },
                    server_info: Implementation::new("http-test-server", "1.0.0"),
                    instructions: None,
                };
                let reply = JSONRPCMessage::response(
                    request.id,
                    serde_json::to_value(result).unwrap()
                );
                (
                    [
                        (CONTENT_TYPE, "application/json"),
                        (HeaderName::from_static("mcp-session-id"), "sess-123"),
                    ],
                    serde_json::to_string(&reply).unwrap(),
                ).into_response()
            }
            "ping" => json_reply(&JSONRPCMessage::response(request.id, json!({}))),
            "tools/list" => {
                let mut properties = HashMap::new();
                properties.insert(
                    "location".to_string(),
                    json!({ "type": "string", "description": "City name" })
                );
                let result = ListToolsResult {
                    tools: vec![Tool {
                        name: "get_weather".to_string(),
                        description: Some("Get the weather".to_string()),
                        input_schema: ToolInputSchema::object(
                            properties,
                            vec!["location".to_string()]
                        ),
                        annotations: None,
                    }],
                    next_cursor: None,
                };
                json_reply(
                    &JSONRPCMessage::response(request.id, serde_json::to_value(result).unwrap())
                )
            }
            // The tool reply arrives as an inline SSE stream.
            "tools/call" => {
                let result = CallToolResult::text("Sunny in Test City");
                let reply = JSONRPCMessage::response(
                    request.id,
                    serde_json::to_value(result).unwrap()
                );
                let body = format!(
                    "event: message\nid: evt-1\ndata: {}\n\n",
                    serde_json::to_string(&reply).unwrap()
                );
                ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn get_handler() -> StatusCode {
        StatusCode::METHOD_NOT_ALLOWED
    }

    async fn delete_handler() -> StatusCode {
        StatusCode::OK
    }

    async fn spawn_test_server(state: Arc<TestState>) -> String {
        let app = Router::new()
            .route("/mcp", post(post_handler).get(get_handler).delete(delete_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/mcp", addr)
    }

    #[tokio::test]
    async fn inline_json_flow_with_session_and_declined_get() {
        let state = Arc::new(TestState::default());
        let url = spawn_test_server(state.clone()).await;

        let client = Client::new(
            Implementation::new("http-client", "0.1.0"),
            ClientOptions::default()
        );
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let sink = errors.clone();
        client.on_error(move |error| {
            sink.lock().unwrap().push(error.to_string());
        });

        let transport = StreamableHttpTransport::new(&url).unwrap();
        let result = client.connect(Box::new(transport)).await.unwrap();
        assert_eq!(result.server_info.name, "http-test-server");

        // The 405 on the GET attempt is not an error; ping still works
        // over plain POST/JSON.
        client.ping().await.unwrap();
        assert!(errors.lock().unwrap().is_empty(), "errors: {:?}", errors.lock().unwrap());

        let seen = state.seen.lock().unwrap().clone();
        assert_eq!(seen[0].method, "initialize");
        assert!(seen[0].session.is_none());

        let ping = seen
            .iter()
            .find(|request| request.method == "ping")
            .expect("ping never reached the server");
        assert_eq!(ping.session.as_deref(), Some("sess-123"));
        assert_eq!(ping.protocol_version.as_deref(), Some(LATEST_PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn list_tools_over_streamable_http() {
        let state = Arc::new(TestState::default());
        let url = spawn_test_server(state).await;

        let client = Client::new(
            Implementation::new("http-client", "0.1.0"),
            ClientOptions::default()
        );
        let transport = StreamableHttpTransport::new(&url).unwrap();
        client.connect(Box::new(transport)).await.unwrap();

        let listed = client.list_tools(None).await.unwrap();
        assert_eq!(listed.tools.len(), 1);
        assert_eq!(listed.tools[0].name, "get_weather");
        assert_eq!(
            listed.tools[0].input_schema.required.as_deref(),
            Some(&["location".to_string()][..])
        );
    }

    #[tokio::test]
    async fn inline_sse_body_carries_the_response() {
        let state = Arc::new(TestState::default());
        let url = spawn_test_server(state).await;

        let client = Client::new(
            Implementation::new("http-client", "0.1.0"),
            ClientOptions::default()
        );
        let transport = StreamableHttpTransport::new(&url).unwrap();
        client.connect(Box::new(transport)).await.unwrap();

        let result = client.call_tool("get_weather", None).await.unwrap();
        match &result.content[0] {
            Content::Text(text) => assert_eq!(text.text, "Sunny in Test City"),
            other => panic!("expected text content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_initialize_body_fails_fast() {
        let state = Arc::new(TestState { invalid_initialize: true, ..Default::default() });
        let url = spawn_test_server(state).await;

        let client = Client::new(
            Implementation::new("http-client", "0.1.0"),
            ClientOptions::default()
        );
        let transport = StreamableHttpTransport::new(&url).unwrap();

        let error = tokio::time
            ::timeout(Duration::from_secs(5), client.connect(Box::new(transport))).await
            .expect("connect hung")
            .unwrap_err();
        assert!(!matches!(error, Error::RequestTimeout), "got a timeout: {:?}", error);
    }
}
