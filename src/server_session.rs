//! One server-side session: an engine bound to one transport, serving the
//! shared [`Server`] registries.
//!
//! The session installs the `initialize` handshake plus the list/call/read
//! handlers for whatever capabilities the server declared, and exposes the
//! server-initiated operations (sampling, roots, elicitation, logging and
//! the change notifications), each gated by the negotiated capabilities.

use std::collections::HashSet;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex as StdMutex, RwLock as StdRwLock };

use serde_json::Value;
use tracing::debug;

use crate::errors::Error;
use crate::protocol::capabilities::ServerCapabilityGate;
use crate::protocol::{ methods, parse_params, Protocol, RequestOptions };
use crate::server::Server;
use crate::transport::Transport;
use crate::types::{
    CallToolParams,
    ClientCapabilities,
    CreateMessageParams,
    CreateMessageResult,
    ElicitationCreateParams,
    ElicitationResult,
    GetPromptParams,
    Implementation,
    InitializeParams,
    InitializeResult,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListRootsResult,
    ListToolsResult,
    LoggingMessageParams,
    ReadResourceParams,
    ResourceUpdatedParams,
    SubscribeParams,
    LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};

#[derive(Default)]
struct SessionState {
    client_capabilities: StdRwLock<Option<ClientCapabilities>>,
    client_info: StdRwLock<Option<Implementation>>,
    negotiated_version: StdRwLock<Option<String>>,
    initialized: AtomicBool,
    subscriptions: StdMutex<HashSet<String>>,
    initialized_observers: StdMutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl SessionState {
    fn ensure_initialized(&self) -> Result<(), Error> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::invalid_request("received request before initialization was complete"))
        }
    }
}

/// A server session over one transport.
pub struct ServerSession {
    protocol: Protocol,
    server: Arc<Server>,
    state: Arc<SessionState>,
}

impl ServerSession {
    /// Build a session for the given server. Call
    /// [`connect`](Self::connect) to bind it to a transport.
    pub fn new(server: Arc<Server>) -> Self {
        let protocol = Protocol::new(server.protocol_options().clone());
        let state = Arc::new(SessionState::default());
        let session = Self { protocol, server, state };
        session.install_handshake_handlers();
        session.install_feature_handlers();
        session
    }

    /// Bind the session to a transport and start it.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> Result<(), Error> {
        self.protocol.connect(transport).await
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The capabilities the client declared, once initialized.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.state.client_capabilities.read().unwrap().clone()
    }

    /// The client's implementation info, once initialized.
    pub fn client_info(&self) -> Option<Implementation> {
        self.state.client_info.read().unwrap().clone()
    }

    /// The negotiated protocol revision, once initialized.
    pub fn negotiated_version(&self) -> Option<String> {
        self.state.negotiated_version.read().unwrap().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    /// Whether the client currently subscribes to updates for `uri`.
    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.state.subscriptions.lock().unwrap().contains(uri)
    }

    /// Observe completion of the handshake. Additive.
    pub fn on_initialized<F: Fn() + Send + Sync + 'static>(&self, observer: F) {
        self.state.initialized_observers.lock().unwrap().push(Box::new(observer));
    }

    /// Observe the session close. Additive.
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, observer: F) {
        self.protocol.on_close(observer);
    }

    /// Ping the client.
    pub async fn ping(&self) -> Result<(), Error> {
        self.protocol.request(methods::PING, None, RequestOptions::default()).await?;
        Ok(())
    }

    /// Ask the client to sample its LLM.
    pub async fn create_message(
        &self,
        params: CreateMessageParams
    ) -> Result<CreateMessageResult, Error> {
        self.request_typed(methods::SAMPLING_CREATE_MESSAGE, Some(serde_json::to_value(params)?)).await
    }

    /// Ask the client for its filesystem roots.
    pub async fn list_roots(&self) -> Result<ListRootsResult, Error> {
        self.request_typed(methods::ROOTS_LIST, None).await
    }

    /// Ask the client to collect user input.
    pub async fn create_elicitation(
        &self,
        params: ElicitationCreateParams
    ) -> Result<ElicitationResult, Error> {
        self.request_typed(methods::ELICITATION_CREATE, Some(serde_json::to_value(params)?)).await
    }

    /// Emit a `notifications/message` log record.
    pub async fn send_logging_message(&self, params: LoggingMessageParams) -> Result<(), Error> {
        self.protocol.notify(methods::NOTIFICATION_MESSAGE, Some(serde_json::to_value(params)?)).await
    }

    /// Tell the client a resource changed.
    pub async fn send_resource_updated(&self, uri: &str) -> Result<(), Error> {
        let params = ResourceUpdatedParams { uri: uri.to_string() };
        self.protocol.notify(
            methods::NOTIFICATION_RESOURCES_UPDATED,
            Some(serde_json::to_value(params)?)
        ).await
    }

    /// Tell the client the resource list changed.
    pub async fn send_resource_list_changed(&self) -> Result<(), Error> {
        self.protocol.notify(methods::NOTIFICATION_RESOURCES_LIST_CHANGED, None).await
    }

    /// Tell the client the tool list changed.
    pub async fn send_tool_list_changed(&self) -> Result<(), Error> {
        self.protocol.notify(methods::NOTIFICATION_TOOLS_LIST_CHANGED, None).await
    }

    /// Tell the client the prompt list changed.
    pub async fn send_prompt_list_changed(&self) -> Result<(), Error> {
        self.protocol.notify(methods::NOTIFICATION_PROMPTS_LIST_CHANGED, None).await
    }

    /// Close the session and its transport.
    pub async fn close(&self) -> Result<(), Error> {
        self.protocol.close().await
    }

    async fn request_typed<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>
    ) -> Result<R, Error> {
        let value = self.protocol.request(method, params, RequestOptions::default()).await?;
        serde_json::from_value(value).map_err(Error::Json)
    }

    fn install_handshake_handlers(&self) {
        let server = self.server.clone();
        let state = self.state.clone();
        let protocol = self.protocol.clone();
        self.protocol.set_request_handler(methods::INITIALIZE, move |params, _context| {
            let server = server.clone();
            let state = state.clone();
            let protocol = protocol.clone();
            Box::pin(async move {
                let params: InitializeParams = parse_params(params)?;

                // Unknown client revisions are answered with ours; the
                // client decides whether it can live with that.
                let version = if
                    SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
                {
                    params.protocol_version.clone()
                } else {
                    LATEST_PROTOCOL_VERSION.to_string()
                };
                debug!(
                    "initialize from {} v{}, negotiated protocol {}",
                    params.client_info.name,
                    params.client_info.version,
                    version
                );

                protocol.set_capability_gate(
                    Arc::new(ServerCapabilityGate {
                        client: params.capabilities.clone(),
                        server: server.capabilities().clone(),
                    })
                );

                *state.client_capabilities.write().unwrap() = Some(params.capabilities);
                *state.client_info.write().unwrap() = Some(params.client_info);
                *state.negotiated_version.write().unwrap() = Some(version.clone());

                let result = InitializeResult {
                    protocol_version: version,
                    capabilities: server.capabilities().clone(),
                    server_info: server.info().clone(),
                    instructions: server.instructions().map(str::to_string),
                };
                Ok(serde_json::to_value(result)?)
            })
        });

        let state = self.state.clone();
        self.protocol.set_notification_handler(methods::NOTIFICATION_INITIALIZED, move |_params| {
            let state = state.clone();
            Box::pin(async move {
                state.initialized.store(true, Ordering::SeqCst);
                for observer in state.initialized_observers.lock().unwrap().iter() {
                    observer();
                }
                Ok(())
            })
        });
    }

    /// Install the feature handlers matching the declared capabilities.
    /// Undeclared features stay unregistered and fall through to
    /// `MethodNotFound`.
    fn install_feature_handlers(&self) {
        let capabilities = self.server.capabilities().clone();

        if capabilities.tools.is_some() {
            self.install_tool_handlers();
        }
        if capabilities.prompts.is_some() {
            self.install_prompt_handlers();
        }
        if capabilities.resources.is_some() {
            let subscribe = capabilities.resources
                .as_ref()
                .and_then(|resources| resources.subscribe)
                .unwrap_or(false);
            self.install_resource_handlers(subscribe);
        }
    }

    fn install_tool_handlers(&self) {
        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::TOOLS_LIST, move |params, _context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let _params: crate::types::ListToolsParams = parse_params(params)?;
                let result = ListToolsResult { tools: server.list_tools(), next_cursor: None };
                Ok(serde_json::to_value(result)?)
            })
        });

        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::TOOLS_CALL, move |params, context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let params: CallToolParams = parse_params(params)?;
                let tool = server
                    .tool(&params.name)
                    .ok_or_else(|| Error::invalid_params(format!("Unknown tool: {}", params.name)))?;
                let result = (tool.handler)(params, context).await?;
                Ok(serde_json::to_value(result)?)
            })
        });
    }

    fn install_prompt_handlers(&self) {
        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::PROMPTS_LIST, move |params, _context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let _params: crate::types::ListPromptsParams = parse_params(params)?;
                let result = ListPromptsResult { prompts: server.list_prompts(), next_cursor: None };
                Ok(serde_json::to_value(result)?)
            })
        });

        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::PROMPTS_GET, move |params, context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let params: GetPromptParams = parse_params(params)?;
                let prompt = server
                    .prompt(&params.name)
                    .ok_or_else(|| {
                        Error::invalid_params(format!("Unknown prompt: {}", params.name))
                    })?;
                let result = (prompt.handler)(params, context).await?;
                Ok(serde_json::to_value(result)?)
            })
        });
    }

    fn install_resource_handlers(&self, subscribe: bool) {
        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::RESOURCES_LIST, move |params, _context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let _params: crate::types::ListResourcesParams = parse_params(params)?;
                let result = ListResourcesResult {
                    resources: server.list_resources(),
                    next_cursor: None,
                };
                Ok(serde_json::to_value(result)?)
            })
        });

        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(
            methods::RESOURCES_TEMPLATES_LIST,
            move |params, _context| {
                let server = server.clone();
                let state = state.clone();
                Box::pin(async move {
                    state.ensure_initialized()?;
                    let _params: crate::types::ListResourceTemplatesParams = parse_params(params)?;
                    let result = ListResourceTemplatesResult {
                        resource_templates: server.list_resource_templates(),
                        next_cursor: None,
                    };
                    Ok(serde_json::to_value(result)?)
                })
            }
        );

        let server = self.server.clone();
        let state = self.state.clone();
        self.protocol.set_request_handler(methods::RESOURCES_READ, move |params, context| {
            let server = server.clone();
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let params: ReadResourceParams = parse_params(params)?;
                let resource = server
                    .resource(&params.uri)
                    .ok_or_else(|| {
                        Error::application(
                            crate::errors::error_codes::RESOURCE_NOT_FOUND,
                            format!("Resource not found: {}", params.uri)
                        )
                    })?;
                let result = (resource.reader)(params, context).await?;
                Ok(serde_json::to_value(result)?)
            })
        });

        if !subscribe {
            return;
        }

        let state = self.state.clone();
        self.protocol.set_request_handler(methods::RESOURCES_SUBSCRIBE, move |params, _context| {
            let state = state.clone();
            Box::pin(async move {
                state.ensure_initialized()?;
                let params: SubscribeParams = parse_params(params)?;
                state.subscriptions.lock().unwrap().insert(params.uri);
                Ok(serde_json::json!({}))
            })
        });

        let state = self.state.clone();
        self.protocol.set_request_handler(
            methods::RESOURCES_UNSUBSCRIBE,
            move |params, _context| {
                let state = state.clone();
                Box::pin(async move {
                    state.ensure_initialized()?;
                    let params: SubscribeParams = parse_params(params)?;
                    state.subscriptions.lock().unwrap().remove(&params.uri);
                    Ok(serde_json::json!({}))
                })
            }
        );
    }
}
