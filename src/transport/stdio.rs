//! Stdio transport.
//!
//! Reads newline-delimited JSON-RPC messages from one byte stream and
//! writes them to another. Two modes: wrap a pair of streams directly (the
//! current process's stdin/stdout for servers), or spawn a subprocess and
//! pipe its stdin/stdout (clients launching a local server).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{ AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt };
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{ debug, warn };

use crate::errors::Error;
use crate::framing::ReadBuffer;
use crate::protocol::messages::JSONRPCMessage;
use crate::transport::{
    encode_message,
    CallbackSlots,
    CloseCallback,
    ErrorCallback,
    MessageCallback,
    SendOptions,
    Transport,
};

type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Command line for the subprocess mode.
struct ChildCommand {
    program: String,
    args: Vec<String>,
    env: Option<HashMap<String, String>>,
}

/// A transport over a pair of byte streams.
pub struct StdioTransport {
    command: Option<ChildCommand>,
    reader: Option<BoxedReader>,
    writer: Option<Arc<Mutex<BoxedWriter>>>,
    child: Option<tokio::process::Child>,
    callbacks: Arc<CallbackSlots>,
    reader_task: Option<JoinHandle<()>>,
    started: bool,
    closed: bool,
    exit_timeout: Duration,
}

impl StdioTransport {
    /// Wrap an arbitrary reader/writer pair.
    pub fn new<R, W>(reader: R, writer: W) -> Self
        where R: AsyncRead + Send + Sync + Unpin + 'static, W: AsyncWrite + Send + Unpin + 'static
    {
        Self {
            command: None,
            reader: Some(Box::new(reader)),
            writer: Some(Arc::new(Mutex::new(Box::new(writer) as BoxedWriter))),
            child: None,
            callbacks: CallbackSlots::new(),
            reader_task: None,
            started: false,
            closed: false,
            exit_timeout: Duration::from_secs(5),
        }
    }

    /// Use the current process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Spawn `program` on `start` and talk to it over its piped
    /// stdin/stdout. Its stderr is inherited.
    pub fn spawn<S: Into<String>>(
        program: S,
        args: Vec<String>,
        env: Option<HashMap<String, String>>
    ) -> Self {
        Self {
            command: Some(ChildCommand { program: program.into(), args, env }),
            reader: None,
            writer: None,
            child: None,
            callbacks: CallbackSlots::new(),
            reader_task: None,
            started: false,
            closed: false,
            exit_timeout: Duration::from_secs(5),
        }
    }

    fn spawn_child(&mut self) -> Result<(), Error> {
        let launch = self.command.as_ref().expect("spawn_child without command");

        let mut command = tokio::process::Command::new(&launch.program);
        command.args(&launch.args);
        if let Some(env) = &launch.env {
            for (key, value) in env {
                command.env(key, value);
            }
        }
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::inherit());
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn {}: {}", launch.program, e)))?;

        let stdin = child.stdin
            .take()
            .ok_or_else(|| Error::Transport("failed to get child stdin".to_string()))?;
        let stdout = child.stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to get child stdout".to_string()))?;

        self.reader = Some(Box::new(stdout));
        self.writer = Some(Arc::new(Mutex::new(Box::new(stdin) as BoxedWriter)));
        self.child = Some(child);
        Ok(())
    }
}

/// Read from the stream, frame messages and push them upward until EOF.
async fn run_reader(mut reader: BoxedReader, callbacks: Arc<CallbackSlots>) {
    let mut buffer = ReadBuffer::new();
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("stdio stream reached EOF");
                break;
            }
            Ok(n) => {
                buffer.append(&chunk[..n]);
                loop {
                    match buffer.read_message() {
                        Ok(Some(message)) => callbacks.emit_message(message),
                        Ok(None) => {
                            break;
                        }
                        Err(e) => {
                            // The offending line was consumed; keep reading.
                            warn!("dropping undecodable stdio line: {}", e);
                            callbacks.emit_error(&e);
                        }
                    }
                }
            }
            Err(e) => {
                callbacks.emit_error(&Error::Io(e));
                break;
            }
        }
    }

    callbacks.emit_close();
}

#[async_trait]
impl Transport for StdioTransport {
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

        if self.command.is_some() {
            self.spawn_child()?;
        }

        let reader = self.reader
            .take()
            .ok_or_else(|| Error::InvalidState("transport has no read stream".to_string()))?;

        self.reader_task = Some(tokio::spawn(run_reader(reader, self.callbacks.clone())));
        self.started = true;
        debug!("stdio transport started");
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
        let writer = self.writer
            .as_ref()
            .ok_or_else(|| Error::InvalidState("transport has no write stream".to_string()))?
            .clone();

        let mut guard = writer.lock().await;
        guard.write_all(json.as_bytes()).await.map_err(Error::Io)?;
        guard.write_all(b"\n").await.map_err(Error::Io)?;
        guard.flush().await.map_err(Error::Io)?;
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
        self.writer = None;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("error killing child process: {}", e);
            }
            match tokio::time::timeout(self.exit_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("child exited with {}", status),
                Ok(Err(e)) => warn!("error waiting for child: {}", e),
                Err(_) => warn!("timeout waiting for child to exit"),
            }
        }

        self.callbacks.emit_close();
        debug!("stdio transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::RequestId;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn delivers_messages_and_close_in_order() {
        let (client_side, mut server_side) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(client_side);
        let mut transport = StdioTransport::new(read_half, write_half);

        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        transport.on_message(Box::new(move |message| {
            if let JSONRPCMessage::Request(req) = message {
                sink.lock().unwrap().push(req.method);
            }
        }));
        let close_sink = seen.clone();
        transport.on_close(Box::new(move || {
            close_sink.lock().unwrap().push("<close>".to_string());
        }));

        transport.start().await.unwrap();

        server_side
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n").await
            .unwrap();
        server_side
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n").await
            .unwrap();
        // Dropping the peer end produces EOF on the reader.
        drop(server_side);

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if seen.lock().unwrap().last().map(|s| s == "<close>").unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }).await.expect("close never observed");

        let order = seen.lock().unwrap().clone();
        assert_eq!(order, vec!["ping", "tools/list", "<close>"]);
    }

    #[tokio::test]
    async fn send_writes_one_line_per_message() {
        let (near, far) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(near);
        let mut transport = StdioTransport::new(read_half, write_half);
        transport.start().await.unwrap();

        transport
            .send(&JSONRPCMessage::request(RequestId::Number(1), "ping", None)).await
            .unwrap();
        transport
            .send(&JSONRPCMessage::notification("notifications/initialized", None)).await
            .unwrap();

        let mut reader = tokio::io::BufReader::new(far);
        let mut first = String::new();
        let mut second = String::new();
        tokio::io::AsyncBufReadExt
            ::read_line(&mut reader, &mut first).await
            .unwrap();
        tokio::io::AsyncBufReadExt
            ::read_line(&mut reader, &mut second).await
            .unwrap();
        assert!(first.contains("\"ping\""));
        assert!(second.contains("\"notifications/initialized\""));
        assert!(first.ends_with('\n'));
    }

    #[tokio::test]
    async fn send_before_start_fails() {
        let (near, _far) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(near);
        let mut transport = StdioTransport::new(read_half, write_half);
        let result = transport.send(&JSONRPCMessage::notification("ping", None)).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn double_start_fails() {
        let (near, _far) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(near);
        let mut transport = StdioTransport::new(read_half, write_half);
        transport.start().await.unwrap();
        assert!(matches!(transport.start().await, Err(Error::InvalidState(_))));
    }
}
