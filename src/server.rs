//! The MCP server: shared registries and server-wide configuration.
//!
//! A [`Server`] is a factory. It owns the tool, prompt and resource
//! registries plus the declared capabilities; every accepted transport
//! produces one [`ServerSession`](crate::server_session::ServerSession)
//! that serves those registries over its own engine.

use std::sync::{ Arc, RwLock as StdRwLock };

use crate::errors::Error;
use crate::protocol::{ BoxFuture, ProtocolOptions, RequestContext };
use crate::registry::Registry;
use crate::server_session::ServerSession;
use crate::transport::Transport;
use crate::types::{
    CallToolParams,
    CallToolResult,
    GetPromptParams,
    GetPromptResult,
    Implementation,
    ReadResourceParams,
    ReadResourceResult,
    Resource,
    ResourceTemplate,
    ServerCapabilities,
    Tool,
    Prompt,
};

/// Handler invoked for `tools/call` on a registered tool.
pub type ToolHandler = Arc<
    dyn (Fn(CallToolParams, RequestContext) -> BoxFuture<'static, Result<CallToolResult, Error>>) +
        Send +
        Sync
>;

/// Provider invoked for `prompts/get` on a registered prompt.
pub type PromptHandler = Arc<
    dyn (Fn(GetPromptParams, RequestContext) -> BoxFuture<'static, Result<GetPromptResult, Error>>) +
        Send +
        Sync
>;

/// Reader invoked for `resources/read` on a registered resource.
pub type ResourceReader = Arc<
    dyn (Fn(
        ReadResourceParams,
        RequestContext
    ) -> BoxFuture<'static, Result<ReadResourceResult, Error>>) +
        Send +
        Sync
>;

#[derive(Clone)]
pub(crate) struct RegisteredTool {
    pub definition: Tool,
    pub handler: ToolHandler,
}

#[derive(Clone)]
pub(crate) struct RegisteredPrompt {
    pub definition: Prompt,
    pub handler: PromptHandler,
}

#[derive(Clone)]
pub(crate) struct RegisteredResource {
    pub definition: Resource,
    pub reader: ResourceReader,
}

/// Server-wide configuration.
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// The capabilities this server declares at initialize time.
    pub capabilities: ServerCapabilities,

    /// Usage instructions returned from `initialize`.
    pub instructions: Option<String>,

    /// Engine options applied to every session.
    pub protocol: ProtocolOptions,
}

/// Shared server state behind every session.
pub struct Server {
    info: Implementation,
    options: ServerOptions,
    pub(crate) tools: StdRwLock<Registry<RegisteredTool>>,
    pub(crate) prompts: StdRwLock<Registry<RegisteredPrompt>>,
    pub(crate) resources: StdRwLock<Registry<RegisteredResource>>,
    pub(crate) resource_templates: StdRwLock<Registry<ResourceTemplate>>,
}

impl Server {
    pub fn new(info: Implementation, options: ServerOptions) -> Self {
        Self {
            info,
            options,
            tools: StdRwLock::new(Registry::new()),
            prompts: StdRwLock::new(Registry::new()),
            resources: StdRwLock::new(Registry::new()),
            resource_templates: StdRwLock::new(Registry::new()),
        }
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.options.capabilities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.options.instructions.as_deref()
    }

    pub(crate) fn protocol_options(&self) -> &ProtocolOptions {
        &self.options.protocol
    }

    /// Create a session for one accepted transport and run the engine on it.
    pub async fn connect(
        self: &Arc<Self>,
        transport: Box<dyn Transport>
    ) -> Result<ServerSession, Error> {
        let session = ServerSession::new(self.clone());
        session.connect(transport).await?;
        Ok(session)
    }

    /// Register a tool. Fails unless the tools capability was declared.
    pub fn add_tool<F, Fut>(&self, definition: Tool, handler: F) -> Result<(), Error>
        where
            F: Fn(CallToolParams, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<CallToolResult, Error>> + Send + 'static
    {
        if self.options.capabilities.tools.is_none() {
            return Err(Error::Capability("server does not declare the tools capability".to_string()));
        }
        let handler: ToolHandler = Arc::new(move |params, context| Box::pin(handler(params, context)));
        self.tools
            .write()
            .unwrap()
            .insert(definition.name.clone(), RegisteredTool { definition, handler });
        Ok(())
    }

    /// Remove a tool. Returns `true` when it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        self.tools.write().unwrap().remove(name)
    }

    /// Register a prompt. Fails unless the prompts capability was declared.
    pub fn add_prompt<F, Fut>(&self, definition: Prompt, handler: F) -> Result<(), Error>
        where
            F: Fn(GetPromptParams, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<GetPromptResult, Error>> + Send + 'static
    {
        if self.options.capabilities.prompts.is_none() {
            return Err(
                Error::Capability("server does not declare the prompts capability".to_string())
            );
        }
        let handler: PromptHandler = Arc::new(move |params, context|
            Box::pin(handler(params, context))
        );
        self.prompts
            .write()
            .unwrap()
            .insert(definition.name.clone(), RegisteredPrompt { definition, handler });
        Ok(())
    }

    /// Remove a prompt. Returns `true` when it existed.
    pub fn remove_prompt(&self, name: &str) -> bool {
        self.prompts.write().unwrap().remove(name)
    }

    /// Register a concrete resource. Fails unless the resources capability
    /// was declared.
    pub fn add_resource<F, Fut>(&self, definition: Resource, reader: F) -> Result<(), Error>
        where
            F: Fn(ReadResourceParams, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        if self.options.capabilities.resources.is_none() {
            return Err(
                Error::Capability("server does not declare the resources capability".to_string())
            );
        }
        let reader: ResourceReader = Arc::new(move |params, context|
            Box::pin(reader(params, context))
        );
        self.resources
            .write()
            .unwrap()
            .insert(definition.uri.clone(), RegisteredResource { definition, reader });
        Ok(())
    }

    /// Remove a resource. Returns `true` when it existed.
    pub fn remove_resource(&self, uri: &str) -> bool {
        self.resources.write().unwrap().remove(uri)
    }

    /// Register a resource template for `resources/templates/list`.
    pub fn add_resource_template(&self, template: ResourceTemplate) -> Result<(), Error> {
        if self.options.capabilities.resources.is_none() {
            return Err(
                Error::Capability("server does not declare the resources capability".to_string())
            );
        }
        self.resource_templates
            .write()
            .unwrap()
            .insert(template.uri_template.clone(), template);
        Ok(())
    }

    pub(crate) fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .read()
            .unwrap()
            .values_in_order()
            .into_iter()
            .map(|tool| tool.definition)
            .collect()
    }

    pub(crate) fn tool(&self, name: &str) -> Option<RegisteredTool> {
        self.tools.read().unwrap().get(name)
    }

    pub(crate) fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts
            .read()
            .unwrap()
            .values_in_order()
            .into_iter()
            .map(|prompt| prompt.definition)
            .collect()
    }

    pub(crate) fn prompt(&self, name: &str) -> Option<RegisteredPrompt> {
        self.prompts.read().unwrap().get(name)
    }

    pub(crate) fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .read()
            .unwrap()
            .values_in_order()
            .into_iter()
            .map(|resource| resource.definition)
            .collect()
    }

    pub(crate) fn resource(&self, uri: &str) -> Option<RegisteredResource> {
        self.resources.read().unwrap().get(uri)
    }

    pub(crate) fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.resource_templates.read().unwrap().values_in_order()
    }
}
