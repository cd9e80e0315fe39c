//! The MCP client role.
//!
//! A [`Client`] wraps one engine: `connect` runs the initialize handshake,
//! records the server's capabilities and installs the capability gate, after
//! which the typed wrappers become available. The client also maintains the
//! roots registry served to `roots/list` and accepts sampling/elicitation
//! handlers for server-initiated requests.

use std::collections::HashMap;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, RwLock as StdRwLock };

use serde_json::Value;
use tracing::debug;

use crate::errors::Error;
use crate::protocol::capabilities::ClientCapabilityGate;
use crate::protocol::{
    methods,
    parse_params,
    BoxFuture,
    Protocol,
    ProtocolOptions,
    RequestOptions,
};
use crate::registry::Registry;
use crate::transport::Transport;
use crate::types::{
    CallToolParams,
    CallToolResult,
    ClientCapabilities,
    CompleteArgument,
    CompleteParams,
    CompleteResult,
    CreateMessageParams,
    CreateMessageResult,
    ElicitationCreateParams,
    ElicitationResult,
    GetPromptParams,
    GetPromptResult,
    Implementation,
    InitializeParams,
    InitializeResult,
    ListPromptsParams,
    ListPromptsResult,
    ListResourceTemplatesParams,
    ListResourceTemplatesResult,
    ListResourcesParams,
    ListResourcesResult,
    ListRootsResult,
    ListToolsParams,
    ListToolsResult,
    LoggingLevel,
    ReadResourceParams,
    ReadResourceResult,
    Reference,
    Root,
    ServerCapabilities,
    SetLevelParams,
    SubscribeParams,
    LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Handler for server-initiated `sampling/createMessage` requests.
pub trait SamplingHandler: Send + Sync {
    fn create_message(
        &self,
        params: CreateMessageParams
    ) -> BoxFuture<'static, Result<CreateMessageResult, Error>>;
}

/// Handler for server-initiated `elicitation/create` requests.
pub trait ElicitationHandler: Send + Sync {
    fn create_elicitation(
        &self,
        params: ElicitationCreateParams
    ) -> BoxFuture<'static, Result<ElicitationResult, Error>>;
}

/// Client-side configuration.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// The capabilities this client declares at initialize time.
    pub capabilities: ClientCapabilities,

    /// Engine options.
    pub protocol: ProtocolOptions,
}

#[derive(Default)]
struct ClientState {
    server_capabilities: StdRwLock<Option<ServerCapabilities>>,
    server_info: StdRwLock<Option<Implementation>>,
    server_instructions: StdRwLock<Option<String>>,
    negotiated_version: StdRwLock<Option<String>>,
    initialized: AtomicBool,
    roots: StdRwLock<Registry<Root>>,
}

/// An MCP client over one transport.
pub struct Client {
    protocol: Protocol,
    info: Implementation,
    capabilities: ClientCapabilities,
    state: Arc<ClientState>,
}

impl Client {
    pub fn new(info: Implementation, options: ClientOptions) -> Self {
        let protocol = Protocol::new(options.protocol);
        let state = Arc::new(ClientState::default());

        // Serve roots/list from the local registry when the capability is
        // declared.
        if options.capabilities.roots.is_some() {
            let handler_state = state.clone();
            protocol.set_request_handler(methods::ROOTS_LIST, move |_params, _context| {
                let state = handler_state.clone();
                Box::pin(async move {
                    let result = ListRootsResult {
                        roots: state.roots.read().unwrap().values_in_order(),
                    };
                    Ok(serde_json::to_value(result)?)
                })
            });
        }

        Self { protocol, info, capabilities: options.capabilities, state }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The server's capabilities, once connected.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.state.server_capabilities.read().unwrap().clone()
    }

    /// The server's implementation info, once connected.
    pub fn server_info(&self) -> Option<Implementation> {
        self.state.server_info.read().unwrap().clone()
    }

    /// The server's usage instructions, when it sent any.
    pub fn server_instructions(&self) -> Option<String> {
        self.state.server_instructions.read().unwrap().clone()
    }

    /// The negotiated protocol revision, once connected.
    pub fn negotiated_version(&self) -> Option<String> {
        self.state.negotiated_version.read().unwrap().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    /// Observe the session close. Additive.
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, observer: F) {
        self.protocol.on_close(observer);
    }

    /// Observe engine-level errors. Additive.
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, observer: F) {
        self.protocol.on_error(observer);
    }

    /// Connect the transport and run the handshake: `initialize`, version
    /// check, then `notifications/initialized`. Fails and closes the
    /// transport when the server requires a revision this client does not
    /// speak.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> Result<InitializeResult, Error> {
        self.protocol.connect(transport).await?;

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            client_info: self.info.clone(),
        };

        let value = match
            self.protocol.request(
                methods::INITIALIZE,
                Some(serde_json::to_value(params)?),
                RequestOptions::default()
            ).await
        {
            Ok(value) => value,
            Err(e) => {
                let _ = self.protocol.close().await;
                return Err(e);
            }
        };

        let result: InitializeResult = match parse_params(Some(value)) {
            Ok(result) => result,
            Err(e) => {
                let _ = self.protocol.close().await;
                return Err(Error::Handshake(format!("malformed initialize result: {}", e)));
            }
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            let version = result.protocol_version.clone();
            let _ = self.protocol.close().await;
            return Err(
                Error::Handshake(format!("server requested unsupported protocol version {}", version))
            );
        }
        debug!(
            "connected to {} v{} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );

        self.protocol.set_capability_gate(
            Arc::new(ClientCapabilityGate {
                server: result.capabilities.clone(),
                client: self.capabilities.clone(),
            })
        );
        self.protocol.set_transport_protocol_version(&result.protocol_version).await;

        *self.state.server_capabilities.write().unwrap() = Some(result.capabilities.clone());
        *self.state.server_info.write().unwrap() = Some(result.server_info.clone());
        *self.state.server_instructions.write().unwrap() = result.instructions.clone();
        *self.state.negotiated_version.write().unwrap() = Some(result.protocol_version.clone());

        self.protocol.notify(methods::NOTIFICATION_INITIALIZED, None).await?;
        self.state.initialized.store(true, Ordering::SeqCst);

        Ok(result)
    }

    /// Close the session and its transport.
    pub async fn close(&self) -> Result<(), Error> {
        self.protocol.close().await
    }

    /// Ping the server.
    pub async fn ping(&self) -> Result<(), Error> {
        self.ensure_initialized()?;
        self.protocol.request(methods::PING, None, RequestOptions::default()).await?;
        Ok(())
    }

    /// List the server's tools.
    pub async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, Error> {
        let params = ListToolsParams { cursor };
        self.request_typed(methods::TOOLS_LIST, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// Invoke a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, Value>>
    ) -> Result<CallToolResult, Error> {
        let params = CallToolParams { name: name.to_string(), arguments };
        self.call_tool_with_options(params, RequestOptions::default()).await
    }

    /// Invoke a tool with explicit request options (timeout, progress
    /// callback, cancellation).
    pub async fn call_tool_with_options(
        &self,
        params: CallToolParams,
        options: RequestOptions
    ) -> Result<CallToolResult, Error> {
        self.request_typed(methods::TOOLS_CALL, Some(serde_json::to_value(params)?), options).await
    }

    /// List the server's prompts.
    pub async fn list_prompts(&self, cursor: Option<String>) -> Result<ListPromptsResult, Error> {
        let params = ListPromptsParams { cursor };
        self.request_typed(methods::PROMPTS_LIST, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// Fetch one prompt, templated with arguments.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>
    ) -> Result<GetPromptResult, Error> {
        let params = GetPromptParams { name: name.to_string(), arguments };
        self.request_typed(methods::PROMPTS_GET, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// List the server's resources.
    pub async fn list_resources(
        &self,
        cursor: Option<String>
    ) -> Result<ListResourcesResult, Error> {
        let params = ListResourcesParams { cursor };
        self.request_typed(methods::RESOURCES_LIST, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// List the server's resource templates.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>
    ) -> Result<ListResourceTemplatesResult, Error> {
        let params = ListResourceTemplatesParams { cursor };
        self.request_typed(
            methods::RESOURCES_TEMPLATES_LIST,
            Some(serde_json::to_value(params)?),
            RequestOptions::default()
        ).await
    }

    /// Read one resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, Error> {
        let params = ReadResourceParams { uri: uri.to_string() };
        self.request_typed(methods::RESOURCES_READ, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// Subscribe to update notifications for a resource.
    pub async fn subscribe_resource(&self, uri: &str) -> Result<(), Error> {
        let params = SubscribeParams { uri: uri.to_string() };
        self.request_typed::<Value>(
            methods::RESOURCES_SUBSCRIBE,
            Some(serde_json::to_value(params)?),
            RequestOptions::default()
        ).await?;
        Ok(())
    }

    /// Cancel update notifications for a resource.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<(), Error> {
        let params = SubscribeParams { uri: uri.to_string() };
        self.request_typed::<Value>(
            methods::RESOURCES_UNSUBSCRIBE,
            Some(serde_json::to_value(params)?),
            RequestOptions::default()
        ).await?;
        Ok(())
    }

    /// Ask the server for argument completions.
    pub async fn complete(
        &self,
        reference: Reference,
        argument: CompleteArgument
    ) -> Result<CompleteResult, Error> {
        let params = CompleteParams { ref_: reference, argument };
        self.request_typed(methods::COMPLETION_COMPLETE, Some(serde_json::to_value(params)?), RequestOptions::default()).await
    }

    /// Adjust the server's logging level.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<(), Error> {
        let params = SetLevelParams { level };
        self.request_typed::<Value>(
            methods::LOGGING_SET_LEVEL,
            Some(serde_json::to_value(params)?),
            RequestOptions::default()
        ).await?;
        Ok(())
    }

    /// Add one root. Requires the roots capability.
    pub fn add_root(&self, root: Root) -> Result<(), Error> {
        self.ensure_roots_capability()?;
        self.state.roots.write().unwrap().insert(root.uri.clone(), root);
        Ok(())
    }

    /// Add several roots. Requires the roots capability.
    pub fn add_roots(&self, roots: Vec<Root>) -> Result<(), Error> {
        self.ensure_roots_capability()?;
        let mut registry = self.state.roots.write().unwrap();
        for root in roots {
            registry.insert(root.uri.clone(), root);
        }
        Ok(())
    }

    /// Remove one root. Returns `true` when it existed.
    pub fn remove_root(&self, uri: &str) -> Result<bool, Error> {
        self.ensure_roots_capability()?;
        Ok(self.state.roots.write().unwrap().remove(uri))
    }

    /// Remove several roots, returning how many existed.
    pub fn remove_roots(&self, uris: &[&str]) -> Result<usize, Error> {
        self.ensure_roots_capability()?;
        let mut registry = self.state.roots.write().unwrap();
        Ok(
            uris
                .iter()
                .filter(|uri| registry.remove(uri))
                .count()
        )
    }

    /// Tell the server the roots list changed. Gated on
    /// `roots.listChanged`.
    pub async fn send_roots_list_changed(&self) -> Result<(), Error> {
        self.protocol.notify(methods::NOTIFICATION_ROOTS_LIST_CHANGED, None).await
    }

    /// Install the handler answering `sampling/createMessage`. Requires the
    /// sampling capability.
    pub fn set_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) -> Result<(), Error> {
        if self.capabilities.sampling.is_none() {
            return Err(
                Error::Capability("client does not declare the sampling capability".to_string())
            );
        }
        self.protocol.set_request_handler(methods::SAMPLING_CREATE_MESSAGE, move |params, _context| {
            let handler = handler.clone();
            Box::pin(async move {
                let params: CreateMessageParams = parse_params(params)?;
                let result = handler.create_message(params).await?;
                Ok(serde_json::to_value(result)?)
            })
        });
        Ok(())
    }

    /// Install the handler answering `elicitation/create`. Requires the
    /// elicitation capability.
    pub fn set_elicitation_handler(
        &self,
        handler: Arc<dyn ElicitationHandler>
    ) -> Result<(), Error> {
        if self.capabilities.elicitation.is_none() {
            return Err(
                Error::Capability("client does not declare the elicitation capability".to_string())
            );
        }
        self.protocol.set_request_handler(methods::ELICITATION_CREATE, move |params, _context| {
            let handler = handler.clone();
            Box::pin(async move {
                let params: ElicitationCreateParams = parse_params(params)?;
                let result = handler.create_elicitation(params).await?;
                Ok(serde_json::to_value(result)?)
            })
        });
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), Error> {
        if self.state.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::InvalidState("client is not initialized".to_string()))
        }
    }

    fn ensure_roots_capability(&self) -> Result<(), Error> {
        if self.capabilities.roots.is_none() {
            return Err(
                Error::Capability("client does not declare the roots capability".to_string())
            );
        }
        Ok(())
    }

    async fn request_typed<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions
    ) -> Result<R, Error> {
        self.ensure_initialized()?;
        let value = self.protocol.request(method, params, options).await?;
        serde_json::from_value(value).map_err(Error::Json)
    }
}
