//! Peer-symmetric JSON-RPC protocol engine.
//!
//! The engine owns a transport exclusively and drives everything both MCP
//! roles share: request/response correlation, handler dispatch, progress
//! relay, cancellation in both directions, timeouts, and the capability
//! gate. There is no client or server in here; the role layers differ only
//! in the handlers they install and the gate they configure.

pub mod capabilities;
pub mod messages;
pub mod methods;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{ AtomicBool, AtomicI64, Ordering };
use std::sync::{ Arc, Mutex as StdMutex, RwLock as StdRwLock };
use std::time::Duration;

use serde_json::{ json, Value };
use tokio::sync::{ oneshot, Notify };
use tracing::{ debug, warn };

use crate::errors::{ Error, ErrorCode, ErrorData };
use crate::protocol::capabilities::CapabilityGate;
use crate::protocol::messages::{
    CancelledParams,
    JSONRPCMessage,
    JSONRPCNotification,
    JSONRPCRequest,
    ProgressParams,
    ProgressToken,
    RequestId,
};
use crate::transport::{ SendOptions, Transport };

/// Boxed future used by the handler registries.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for an inbound request: `(params, context) -> result | error`.
pub type RequestHandlerFn = Arc<
    dyn (Fn(Option<Value>, RequestContext) -> BoxFuture<'static, Result<Value, Error>>) +
        Send +
        Sync
>;

/// Handler for an inbound notification.
pub type NotificationHandlerFn = Arc<
    dyn (Fn(Option<Value>) -> BoxFuture<'static, Result<(), Error>>) + Send + Sync
>;

/// Callback invoked for each `notifications/progress` matching a request.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// One progress update relayed to a request's caller.
#[derive(Debug, Clone)]
pub struct Progress {
    /// The progress thus far.
    pub progress: f64,
    /// Total amount of work, if known.
    pub total: Option<f64>,
    /// Optional human-readable status.
    pub message: Option<String>,
}

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine-wide options.
#[derive(Clone)]
pub struct ProtocolOptions {
    /// Deadline applied to requests that do not override it.
    pub request_timeout: Duration,

    /// Whether a received progress notification re-arms the request's
    /// deadline.
    pub reset_timeout_on_progress: bool,

    /// Whether the capability gate runs before outbound requests and
    /// notifications.
    pub enforce_capabilities: bool,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reset_timeout_on_progress: false,
            enforce_capabilities: true,
        }
    }
}

/// Per-request options.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Deadline override for this request.
    pub timeout: Option<Duration>,

    /// Override of [`ProtocolOptions::reset_timeout_on_progress`].
    pub reset_timeout_on_progress: Option<bool>,

    /// Progress callback; its presence makes the engine attach a progress
    /// token to the outgoing request.
    pub on_progress: Option<ProgressCallback>,

    /// Cooperative cancellation for the caller.
    pub cancel: Option<CancelToken>,
}

/// A clonable cancellation token for outbound requests.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every request holding a clone of this token.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel cannot
        // slip between the check and the wait.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Context handed to request handlers.
#[derive(Clone)]
pub struct RequestContext {
    /// The id of the request being handled.
    pub request_id: RequestId,

    /// The caller's progress token, when the request carries one.
    pub progress_token: Option<ProgressToken>,

    core: Arc<ProtocolCore>,
}

impl RequestContext {
    /// Emit a `notifications/progress` for this request. No-op when the
    /// caller did not ask for progress.
    pub async fn send_progress(&self, progress: Progress) -> Result<(), Error> {
        let token = match &self.progress_token {
            Some(token) => token.clone(),
            None => {
                return Ok(());
            }
        };
        let params = ProgressParams {
            progress_token: token,
            progress: progress.progress,
            total: progress.total,
            message: progress.message,
        };
        let message = JSONRPCMessage::notification(
            methods::NOTIFICATION_PROGRESS,
            Some(serde_json::to_value(params)?)
        );
        self.core.send_message(&message, SendOptions::default()).await
    }
}

struct PendingRequest {
    tx: oneshot::Sender<Result<Value, Error>>,
    progress_token: Option<ProgressToken>,
}

#[derive(Clone)]
struct ProgressEntry {
    callback: ProgressCallback,
    /// Present when the deadline re-arms on progress.
    deadline: Option<Arc<StdMutex<tokio::time::Instant>>>,
    timeout: Duration,
}

struct ProtocolCore {
    options: ProtocolOptions,
    transport: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
    next_id: AtomicI64,
    pending: StdMutex<HashMap<RequestId, PendingRequest>>,
    progress_entries: StdMutex<HashMap<ProgressToken, ProgressEntry>>,
    inflight: StdMutex<HashMap<RequestId, tokio::task::AbortHandle>>,
    request_handlers: StdRwLock<HashMap<String, RequestHandlerFn>>,
    notification_handlers: StdRwLock<HashMap<String, NotificationHandlerFn>>,
    gate: StdRwLock<Option<Arc<dyn CapabilityGate>>>,
    error_observers: StdMutex<Vec<Box<dyn Fn(&Error) + Send + Sync>>>,
    close_observers: StdMutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    connected: AtomicBool,
    close_handled: AtomicBool,
}

/// The protocol engine. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Protocol {
    core: Arc<ProtocolCore>,
}

impl Protocol {
    pub fn new(options: ProtocolOptions) -> Self {
        let protocol = Self {
            core: Arc::new(ProtocolCore {
                options,
                transport: tokio::sync::Mutex::new(None),
                next_id: AtomicI64::new(1),
                pending: StdMutex::new(HashMap::new()),
                progress_entries: StdMutex::new(HashMap::new()),
                inflight: StdMutex::new(HashMap::new()),
                request_handlers: StdRwLock::new(HashMap::new()),
                notification_handlers: StdRwLock::new(HashMap::new()),
                gate: StdRwLock::new(None),
                error_observers: StdMutex::new(Vec::new()),
                close_observers: StdMutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                close_handled: AtomicBool::new(false),
            }),
        };

        // Every peer answers ping.
        protocol.set_request_handler(methods::PING, |_params, _ctx| {
            Box::pin(async { Ok(json!({})) })
        });

        protocol
    }

    pub fn options(&self) -> &ProtocolOptions {
        &self.core.options
    }

    /// Install a request handler, replacing any prior handler for the
    /// method.
    pub fn set_request_handler<F>(&self, method: &str, handler: F)
        where
            F: Fn(Option<Value>, RequestContext) -> BoxFuture<'static, Result<Value, Error>> +
                Send +
                Sync +
                'static
    {
        self.core.request_handlers
            .write()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
    }

    pub fn remove_request_handler(&self, method: &str) {
        self.core.request_handlers.write().unwrap().remove(method);
    }

    /// Install a notification handler, replacing any prior handler for the
    /// method.
    pub fn set_notification_handler<F>(&self, method: &str, handler: F)
        where
            F: Fn(Option<Value>) -> BoxFuture<'static, Result<(), Error>> + Send + Sync + 'static
    {
        self.core.notification_handlers
            .write()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
    }

    pub fn remove_notification_handler(&self, method: &str) {
        self.core.notification_handlers.write().unwrap().remove(method);
    }

    /// Install the role's capability policy.
    pub fn set_capability_gate(&self, gate: Arc<dyn CapabilityGate>) {
        *self.core.gate.write().unwrap() = Some(gate);
    }

    /// Observe engine-level errors. Additive.
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, observer: F) {
        self.core.error_observers.lock().unwrap().push(Box::new(observer));
    }

    /// Observe the session close. Additive.
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, observer: F) {
        self.core.close_observers.lock().unwrap().push(Box::new(observer));
    }

    pub fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::SeqCst)
    }

    /// Take ownership of the transport, wire the dispatcher into it and
    /// start it.
    pub async fn connect(&self, mut transport: Box<dyn Transport>) -> Result<(), Error> {
        let dispatch_core = self.core.clone();
        transport.on_message(
            Box::new(move |message| {
                ProtocolCore::dispatch(&dispatch_core, message);
            })
        );

        let error_core = self.core.clone();
        transport.on_error(
            Box::new(move |error| {
                warn!("transport error: {}", error);
                error_core.notify_error(error);
            })
        );

        let close_core = self.core.clone();
        transport.on_close(
            Box::new(move || {
                close_core.handle_transport_close();
            })
        );

        let mut guard = self.core.transport.lock().await;
        if guard.is_some() {
            return Err(Error::InvalidState("engine already has a transport".to_string()));
        }
        transport.start().await?;
        *guard = Some(transport);
        self.core.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Record the negotiated protocol revision on the transport.
    pub async fn set_transport_protocol_version(&self, version: &str) {
        if let Some(transport) = self.core.transport.lock().await.as_mut() {
            transport.set_protocol_version(version);
        }
    }

    /// Send a request and await its outcome.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions
    ) -> Result<Value, Error> {
        let core = &self.core;

        if core.options.enforce_capabilities {
            let gate = core.gate.read().unwrap().clone();
            if let Some(gate) = gate {
                gate.check_request(method)?;
            }
        }

        let id = RequestId::Number(core.next_id.fetch_add(1, Ordering::SeqCst));
        let timeout = options.timeout.unwrap_or(core.options.request_timeout);
        let reset_on_progress = options.reset_timeout_on_progress.unwrap_or(
            core.options.reset_timeout_on_progress
        );
        let deadline = Arc::new(StdMutex::new(tokio::time::Instant::now() + timeout));

        let mut params = params;
        let progress_token = match &options.on_progress {
            Some(callback) => {
                let token = ProgressToken::from(&id);
                params = Some(inject_progress_token(params, &token)?);
                core.progress_entries.lock().unwrap().insert(token.clone(), ProgressEntry {
                    callback: callback.clone(),
                    deadline: if reset_on_progress {
                        Some(deadline.clone())
                    } else {
                        None
                    },
                    timeout,
                });
                Some(token)
            }
            None => None,
        };

        let (tx, mut rx) = oneshot::channel();
        // Insert strictly before the serialized send: the response may race
        // the send call's return.
        core.pending
            .lock()
            .unwrap()
            .insert(id.clone(), PendingRequest { tx, progress_token });

        let message = JSONRPCMessage::Request(JSONRPCRequest::new(id.clone(), method, params));
        if let Err(e) = core.send_message(&message, SendOptions::default()).await {
            core.remove_request_state(&id);
            return Err(e);
        }

        let initial_deadline = *deadline.lock().unwrap();
        let sleep = tokio::time::sleep_until(initial_deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                outcome = &mut rx => {
                    return match outcome {
                        Ok(result) => result,
                        Err(_) => Err(Error::Disconnected),
                    };
                }
                _ = &mut sleep => {
                    let current = *deadline.lock().unwrap();
                    if tokio::time::Instant::now() >= current {
                        core.remove_request_state(&id);
                        core.spawn_cancel_notification(id.clone(), "timeout");
                        return Err(Error::RequestTimeout);
                    }
                    // Progress pushed the deadline; re-arm.
                    sleep.as_mut().reset(current);
                }
                _ = wait_cancelled(&options.cancel) => {
                    core.remove_request_state(&id);
                    core.spawn_cancel_notification(id.clone(), "cancelled");
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    /// Send a notification. No id, no correlation, no timeout.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), Error> {
        if self.core.options.enforce_capabilities {
            let gate = self.core.gate.read().unwrap().clone();
            if let Some(gate) = gate {
                gate.check_notification(method)?;
            }
        }
        let message = JSONRPCMessage::notification(method, params);
        self.core.send_message(&message, SendOptions::default()).await
    }

    /// Close the transport and fail everything outstanding.
    pub async fn close(&self) -> Result<(), Error> {
        let transport = {
            let mut guard = self.core.transport.lock().await;
            guard.take()
        };
        if let Some(mut transport) = transport {
            transport.close().await?;
        }
        self.core.handle_transport_close();
        Ok(())
    }
}

impl ProtocolCore {
    fn dispatch(core: &Arc<Self>, message: JSONRPCMessage) {
        match message {
            JSONRPCMessage::Response(response) => {
                core.complete_pending(&response.id, Ok(response.result));
            }
            JSONRPCMessage::Error(error) => {
                match error.id {
                    Some(id) => {
                        core.complete_pending(&id, Err(Error::Protocol {
                            code: error.error.code,
                            message: error.error.message,
                            data: error.error.data,
                        }));
                    }
                    None => warn!("peer reported an unattributable error: {}", error.error.message),
                }
            }
            JSONRPCMessage::Request(request) => core.handle_request(request),
            JSONRPCMessage::Notification(notification) => core.handle_notification(notification),
        }
    }

    fn complete_pending(&self, id: &RequestId, outcome: Result<Value, Error>) {
        let record = self.pending.lock().unwrap().remove(id);
        match record {
            Some(record) => {
                if let Some(token) = &record.progress_token {
                    self.progress_entries.lock().unwrap().remove(token);
                }
                let _ = record.tx.send(outcome);
            }
            None => debug!("dropping response for unknown request id {}", id),
        }
    }

    fn remove_request_state(&self, id: &RequestId) {
        let record = self.pending.lock().unwrap().remove(id);
        if let Some(record) = record {
            if let Some(token) = &record.progress_token {
                self.progress_entries.lock().unwrap().remove(token);
            }
        }
    }

    fn handle_request(self: &Arc<Self>, request: JSONRPCRequest) {
        let handler = self.request_handlers.read().unwrap().get(&request.method).cloned();
        let handler = match handler {
            Some(handler) => handler,
            None => {
                debug!("no handler for request method {}", request.method);
                let core = self.clone();
                let id = request.id;
                let method = request.method;
                tokio::spawn(async move {
                    let payload = ErrorData::new(
                        ErrorCode::MethodNotFound,
                        format!("Method not found: {}", method)
                    );
                    core.send_reply(JSONRPCMessage::error(Some(id), payload)).await;
                });
                return;
            }
        };

        let id = request.id.clone();
        let context = RequestContext {
            request_id: id.clone(),
            progress_token: extract_progress_token(request.params.as_ref()),
            core: self.clone(),
        };

        let core = self.clone();
        let done = Arc::new(AtomicBool::new(false));
        let done_in_task = done.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let result = handler(request.params, context).await;
            done_in_task.store(true, Ordering::SeqCst);
            core.inflight.lock().unwrap().remove(&task_id);

            match result {
                Ok(value) => {
                    core.send_reply(JSONRPCMessage::response(task_id, value)).await;
                }
                Err(error) => {
                    if !matches!(error, Error::Protocol { .. }) {
                        core.notify_error(&error);
                    }
                    let payload = error.to_error_data();
                    core.send_reply(JSONRPCMessage::error(Some(task_id), payload)).await;
                }
            }
        });

        // Track the task for inbound cancellation unless it already ended.
        let mut inflight = self.inflight.lock().unwrap();
        if !done.load(Ordering::SeqCst) {
            inflight.insert(id, task.abort_handle());
        }
    }

    fn handle_notification(self: &Arc<Self>, notification: JSONRPCNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_PROGRESS => self.handle_progress(notification.params),
            methods::NOTIFICATION_CANCELLED => self.handle_cancelled(notification.params),
            method => {
                let handler = self.notification_handlers.read().unwrap().get(method).cloned();
                match handler {
                    Some(handler) => {
                        let core = self.clone();
                        let method = method.to_string();
                        tokio::spawn(async move {
                            if let Err(e) = handler(notification.params).await {
                                warn!("notification handler for {} failed: {}", method, e);
                                core.notify_error(&e);
                            }
                        });
                    }
                    None => debug!("dropping unhandled notification {}", method),
                }
            }
        }
    }

    fn handle_progress(&self, params: Option<Value>) {
        let params: ProgressParams = match
            params.and_then(|value| serde_json::from_value(value).ok())
        {
            Some(params) => params,
            None => {
                warn!("malformed progress notification");
                return;
            }
        };

        let entry = self.progress_entries.lock().unwrap().get(&params.progress_token).cloned();
        match entry {
            Some(entry) => {
                if let Some(deadline) = &entry.deadline {
                    *deadline.lock().unwrap() = tokio::time::Instant::now() + entry.timeout;
                }
                (entry.callback)(Progress {
                    progress: params.progress,
                    total: params.total,
                    message: params.message,
                });
            }
            None => debug!("progress for unknown token {}", params.progress_token),
        }
    }

    fn handle_cancelled(&self, params: Option<Value>) {
        let params: CancelledParams = match
            params.and_then(|value| serde_json::from_value(value).ok())
        {
            Some(params) => params,
            None => {
                warn!("malformed cancellation notification");
                return;
            }
        };

        let handle = self.inflight.lock().unwrap().remove(&params.request_id);
        match handle {
            Some(handle) => {
                debug!(
                    "peer cancelled request {} ({})",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason")
                );
                handle.abort();
            }
            // Unknown or already-finished request: dropped silently.
            None => debug!("cancellation for unknown request {}", params.request_id),
        }
    }

    async fn send_message(&self, message: &JSONRPCMessage, options: SendOptions) -> Result<(), Error> {
        let mut guard = self.transport.lock().await;
        match guard.as_mut() {
            Some(transport) => transport.send_with_options(message, options).await,
            None => Err(Error::Disconnected),
        }
    }

    async fn send_reply(&self, message: JSONRPCMessage) {
        if let Err(e) = self.send_message(&message, SendOptions::default()).await {
            warn!("failed to send reply: {}", e);
            self.notify_error(&e);
        }
    }

    fn spawn_cancel_notification(self: &Arc<Self>, request_id: RequestId, reason: &str) {
        let core = self.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            let params = CancelledParams { request_id, reason: Some(reason) };
            let message = JSONRPCMessage::notification(
                methods::NOTIFICATION_CANCELLED,
                serde_json::to_value(params).ok()
            );
            if let Err(e) = core.send_message(&message, SendOptions::default()).await {
                debug!("courtesy cancellation not delivered: {}", e);
            }
        });
    }

    fn notify_error(&self, error: &Error) {
        for observer in self.error_observers.lock().unwrap().iter() {
            observer(error);
        }
    }

    fn handle_transport_close(&self) {
        if self.close_handled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);

        let pending: Vec<PendingRequest> = {
            let mut guard = self.pending.lock().unwrap();
            guard.drain().map(|(_, record)| record).collect()
        };
        for record in pending {
            let _ = record.tx.send(Err(Error::Disconnected));
        }
        self.progress_entries.lock().unwrap().clear();

        let inflight: Vec<tokio::task::AbortHandle> = {
            let mut guard = self.inflight.lock().unwrap();
            guard.drain().map(|(_, handle)| handle).collect()
        };
        for handle in inflight {
            handle.abort();
        }

        for observer in self.close_observers.lock().unwrap().iter() {
            observer();
        }

        // Handlers and observers may capture the engine; dropping them here
        // breaks those reference cycles once the session is over.
        self.request_handlers.write().unwrap().clear();
        self.notification_handlers.write().unwrap().clear();
        *self.gate.write().unwrap() = None;
        self.error_observers.lock().unwrap().clear();
        self.close_observers.lock().unwrap().clear();
    }
}

async fn wait_cancelled(token: &Option<CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Place the progress token at `params._meta.progressToken`, creating the
/// object layers as needed.
fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Result<Value, Error> {
    let mut params = match params {
        Some(Value::Object(map)) => Value::Object(map),
        None => json!({}),
        Some(_) => {
            return Err(Error::invalid_params("request params must be an object"));
        }
    };

    let map = params.as_object_mut().expect("params is an object");
    let meta = map
        .entry("_meta".to_string())
        .or_insert_with(|| json!({}));
    match meta {
        Value::Object(meta) => {
            meta.insert("progressToken".to_string(), serde_json::to_value(token)?);
        }
        _ => {
            return Err(Error::invalid_params("params._meta must be an object"));
        }
    }
    Ok(params)
}

/// Decode handler params, treating absent params as an empty object.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>
) -> Result<T, Error> {
    let value = params.unwrap_or_else(|| json!({}));
    serde_json
        ::from_value(value)
        .map_err(|e| Error::invalid_params(format!("invalid params: {}", e)))
}

fn extract_progress_token(params: Option<&Value>) -> Option<ProgressToken> {
    let token = params?.get("_meta")?.get("progressToken")?;
    serde_json::from_value(token.clone()).ok()
}
