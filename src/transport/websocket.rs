//! WebSocket transport.
//!
//! One full-duplex channel negotiated with the `mcp` subprotocol; each
//! JSON-RPC message rides in one text frame. Binary frames and decode
//! failures are protocol violations that terminate the connection.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{ SplitSink, SplitStream };
use futures_util::{ SinkExt, StreamExt };
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{ connect_async, MaybeTlsStream, WebSocketStream };
use tracing::{ debug, warn };
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

/// The WebSocket subprotocol MCP runs over.
pub const MCP_SUBPROTOCOL: &str = "mcp";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket client transport.
pub struct WebSocketTransport {
    url: Url,
    callbacks: Arc<CallbackSlots>,
    sink: Option<Arc<Mutex<WsSink>>>,
    reader_task: Option<JoinHandle<()>>,
    started: bool,
    closed: bool,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e|
            Error::Transport(format!("invalid WebSocket URL: {}", e))
        )?;
        Ok(Self {
            url,
            callbacks: CallbackSlots::new(),
            sink: None,
            reader_task: None,
            started: false,
            closed: false,
        })
    }
}

/// Forward inbound frames until the channel closes or a violation occurs.
async fn run_reader(mut source: WsSource, callbacks: Arc<CallbackSlots>) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                match decode_message(&text) {
                    Ok(message) => callbacks.emit_message(message),
                    Err(e) => {
                        callbacks.emit_error(&e);
                        break;
                    }
                }
            }
            Ok(WsMessage::Binary(_)) => {
                callbacks.emit_error(
                    &Error::Transport("unexpected binary WebSocket frame".to_string())
                );
                break;
            }
            Ok(WsMessage::Close(_)) => {
                debug!("WebSocket closed by peer");
                break;
            }
            // Ping/pong are handled by the library.
            Ok(_) => {}
            Err(e) => {
                callbacks.emit_error(&Error::Transport(format!("WebSocket error: {}", e)));
                break;
            }
        }
    }

    callbacks.emit_close();
}

#[async_trait]
impl Transport for WebSocketTransport {
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

        let mut request = self.url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(format!("invalid WebSocket request: {}", e)))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(MCP_SUBPROTOCOL));

        let (stream, _response) = connect_async(request).await.map_err(|e|
            Error::Transport(format!("WebSocket connect failed: {}", e))
        )?;

        let (sink, source) = stream.split();
        self.sink = Some(Arc::new(Mutex::new(sink)));
        self.reader_task = Some(tokio::spawn(run_reader(source, self.callbacks.clone())));
        self.started = true;
        debug!("WebSocket transport connected to {}", self.url);
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

        let json = encode_message(message)?;
        let sink = self.sink
            .as_ref()
            .ok_or_else(|| Error::InvalidState("transport has no sink".to_string()))?
            .clone();
        let result = sink
            .lock().await
            .send(WsMessage::Text(json)).await
            .map_err(|e| Error::Transport(format!("WebSocket send failed: {}", e)));
        result
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState("transport was never started".to_string()));
        }
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.lock().await.close().await {
                warn!("error closing WebSocket: {}", e);
            }
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        self.callbacks.emit_close();
        debug!("WebSocket transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::RequestId;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// A loopback WebSocket peer that answers every request with an empty
    /// result.
    async fn spawn_ws_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let stream = tokio_tungstenite::accept_hdr_async(socket, |_req: &tokio_tungstenite::tungstenite::handshake::server::Request, mut response: tokio_tungstenite::tungstenite::handshake::server::Response| {
                        response
                            .headers_mut()
                            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(MCP_SUBPROTOCOL));
                        Ok(response)
                    }).await.unwrap();
                    let (mut sink, mut source) = stream.split();
                    while let Some(Ok(frame)) = source.next().await {
                        if let WsMessage::Text(text) = frame {
                            let message: JSONRPCMessage = serde_json::from_str(&text).unwrap();
                            if let JSONRPCMessage::Request(request) = message {
                                let reply = JSONRPCMessage::response(
                                    request.id,
                                    serde_json::json!({})
                                );
                                let json = serde_json::to_string(&reply).unwrap();
                                if sink.send(WsMessage::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn text_frames_round_trip() {
        let url = spawn_ws_echo_server().await;
        let mut transport = WebSocketTransport::new(&url).unwrap();

        let seen: Arc<StdMutex<Vec<RequestId>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        transport.on_message(Box::new(move |message| {
            if let JSONRPCMessage::Response(response) = message {
                sink.lock().unwrap().push(response.id);
            }
        }));

        transport.start().await.unwrap();
        transport
            .send(&JSONRPCMessage::request(RequestId::Number(7), "ping", None)).await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !seen.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }).await.expect("no response received");

        assert_eq!(seen.lock().unwrap()[0], RequestId::Number(7));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_before_start_fails() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/ws").unwrap();
        let result = transport.send(&JSONRPCMessage::notification("ping", None)).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
