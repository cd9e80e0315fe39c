//! Legacy SSE client transport.
//!
//! Two HTTP channels: a long-lived GET producing an SSE stream for inbound
//! messages, and an HTTP POST per outbound message. The server's first
//! event must be `endpoint`, whose data names the POST target; `start`
//! blocks until that event arrives.

use std::sync::{ Arc, RwLock as StdRwLock };
use std::time::Duration;

use async_trait::async_trait;
use eventsource_client as es;
use eventsource_client::Client as _;
use futures::TryStreamExt;
use reqwest::header;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::errors::Error;
use crate::protocol::messages::JSONRPCMessage;
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

/// Options for the SSE client transport.
#[derive(Clone, Debug)]
pub struct SseOptions {
    /// Bearer token added to both channels.
    pub auth_token: Option<String>,
    /// Extra headers added to both channels.
    pub custom_headers: Vec<(String, String)>,
    /// How long `start` waits for the `endpoint` event.
    pub connect_timeout: Duration,
    /// Timeout for each POST.
    pub request_timeout: Duration,
    /// Initial reconnect delay for the SSE stream.
    pub retry_delay: Duration,
    /// Upper bound for the reconnect backoff.
    pub max_retry_delay: Duration,
    /// Reconnect backoff multiplier.
    pub backoff_factor: u32,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            auth_token: None,
            custom_headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            backoff_factor: 2,
        }
    }
}

/// Client-side SSE transport.
pub struct SseTransport {
    sse_url: Url,
    http: reqwest::Client,
    options: SseOptions,
    callbacks: Arc<CallbackSlots>,
    endpoint: Arc<StdRwLock<Option<Url>>>,
    reader_task: Option<JoinHandle<()>>,
    started: bool,
    closed: bool,
}

impl SseTransport {
    /// Create a transport for the given SSE URL.
    pub fn new(sse_url: &str) -> Result<Self, Error> {
        Self::with_options(sse_url, SseOptions::default())
    }

    /// Create a transport with explicit options.
    pub fn with_options(sse_url: &str, options: SseOptions) -> Result<Self, Error> {
        let sse_url = Url::parse(sse_url).map_err(|e|
            Error::Transport(format!("invalid SSE URL: {}", e))
        )?;

        let mut headers = header::HeaderMap::new();
        if let Some(token) = &options.auth_token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue
                    ::from_str(&format!("Bearer {}", token))
                    .map_err(|e| Error::Transport(format!("invalid auth token: {}", e)))?
            );
        }
        for (name, value) in &options.custom_headers {
            let name = header::HeaderName
                ::from_bytes(name.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name {}: {}", name, e)))?;
            let value = header::HeaderValue
                ::from_str(value)
                .map_err(|e| Error::Transport(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client
            ::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            sse_url,
            http,
            options,
            callbacks: CallbackSlots::new(),
            endpoint: Arc::new(StdRwLock::new(None)),
            reader_task: None,
            started: false,
            closed: false,
        })
    }

    fn build_stream_client(&self) -> Result<impl es::Client, Error> {
        let mut builder = es::ClientBuilder
            ::for_url(self.sse_url.as_str())
            .map_err(|e| Error::Transport(format!("invalid SSE URL: {}", e)))?;

        if let Some(token) = &self.options.auth_token {
            builder = builder
                .header("Authorization", &format!("Bearer {}", token))
                .map_err(|e| Error::Transport(format!("failed to add auth header: {}", e)))?;
        }
        for (name, value) in &self.options.custom_headers {
            builder = builder
                .header(name, value)
                .map_err(|e| Error::Transport(format!("failed to add header {}: {}", name, e)))?;
        }

        let reconnect = es::ReconnectOptions
            ::reconnect(true)
            .retry_initial(false)
            .delay(self.options.retry_delay)
            .backoff_factor(self.options.backoff_factor)
            .delay_max(self.options.max_retry_delay)
            .build();

        Ok(builder.reconnect(reconnect).build())
    }
}

/// Drive the SSE stream, resolving the endpoint event and forwarding
/// messages until the stream ends.
async fn run_stream(
    client: impl es::Client,
    base_url: Url,
    endpoint: Arc<StdRwLock<Option<Url>>>,
    endpoint_tx: tokio::sync::watch::Sender<bool>,
    callbacks: Arc<CallbackSlots>
) {
    let mut stream = client.stream();

    loop {
        match stream.try_next().await {
            Ok(Some(es::SSE::Event(event))) => {
                match event.event_type.as_str() {
                    "endpoint" => {
                        // Relative endpoints resolve against the URL up to
                        // and including its last '/'.
                        match base_url.join(event.data.trim()) {
                            Ok(url) => {
                                debug!("SSE endpoint resolved to {}", url);
                                *endpoint.write().unwrap() = Some(url);
                                let _ = endpoint_tx.send(true);
                            }
                            Err(e) => {
                                let error = Error::Transport(
                                    format!("invalid endpoint {}: {}", event.data, e)
                                );
                                callbacks.emit_error(&error);
                                break;
                            }
                        }
                    }
                    "message" | "" => {
                        match decode_message(&event.data) {
                            Ok(message) => callbacks.emit_message(message),
                            Err(e) => {
                                // Structured stream: a framing error is fatal.
                                callbacks.emit_error(&e);
                                break;
                            }
                        }
                    }
                    "error" => {
                        callbacks.emit_error(&Error::Transport(event.data));
                    }
                    other => debug!("ignoring SSE event type {}", other),
                }
            }
            Ok(Some(es::SSE::Comment(_))) => {}
            Ok(None) => {
                debug!("SSE stream ended");
                break;
            }
            Err(e) => {
                callbacks.emit_error(&Error::Transport(format!("SSE stream error: {}", e)));
                break;
            }
        }
    }

    callbacks.emit_close();
}

#[async_trait]
impl Transport for SseTransport {
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

        let client = self.build_stream_client()?;
        let (endpoint_tx, mut endpoint_rx) = tokio::sync::watch::channel(false);

        self.reader_task = Some(
            tokio::spawn(
                run_stream(
                    client,
                    self.sse_url.clone(),
                    self.endpoint.clone(),
                    endpoint_tx,
                    self.callbacks.clone()
                )
            )
        );

        // The transport is not usable until the server names the POST
        // endpoint.
        let wait = async {
            loop {
                if *endpoint_rx.borrow() {
                    return true;
                }
                if endpoint_rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        match tokio::time::timeout(self.options.connect_timeout, wait).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(
                    Error::Transport("SSE stream closed before the endpoint event".to_string())
                );
            }
            Err(_) => {
                if let Some(task) = self.reader_task.take() {
                    task.abort();
                }
                return Err(Error::Transport("timed out waiting for the endpoint event".to_string()));
            }
        }

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

        let endpoint = self.endpoint
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::InvalidState("no endpoint received".to_string()))?;

        let body = encode_message(message)?;
        let response = self.http
            .post(endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send().await
            .map_err(|e| Error::Transport(format!("POST failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!("server returned HTTP {}", response.status())));
        }
        // The response body is ignored; messages flow back on the stream.
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

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.callbacks.emit_close();
        debug!("SSE transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_resolution_follows_base_url() {
        let base = Url::parse("http://localhost:8090/sse").unwrap();
        assert_eq!(
            base.join("/message?sessionId=1").unwrap().as_str(),
            "http://localhost:8090/message?sessionId=1"
        );
        assert_eq!(
            base.join("message?sessionId=1").unwrap().as_str(),
            "http://localhost:8090/message?sessionId=1"
        );

        let nested = Url::parse("http://localhost:8090/mcp/sse").unwrap();
        assert_eq!(
            nested.join("message").unwrap().as_str(),
            "http://localhost:8090/mcp/message"
        );

        // Absolute endpoints win outright.
        assert_eq!(
            base.join("http://other:9999/post").unwrap().as_str(),
            "http://other:9999/post"
        );
    }
}
