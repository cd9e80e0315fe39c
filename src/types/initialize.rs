//! The initialization handshake: implementation info, capability sets and
//! the `initialize` request/result pair.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// The protocol revision this crate speaks by default.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Every protocol revision this crate accepts during the handshake.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[
    "2025-06-18",
    "2025-03-26",
    "2024-11-05",
];

/// Describes the name and version of an MCP implementation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Implementation {
    /// The name of the implementation.
    pub name: String,

    /// The version of the implementation.
    pub version: String,
}

impl Implementation {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

/// Roots capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct RootsCapability {
    /// Whether the client emits `notifications/roots/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "listChanged")]
    pub list_changed: Option<bool>,
}

/// Capabilities a client may support.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ClientCapabilities {
    /// Present if the client supports sampling from an LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<HashMap<String, Value>>,

    /// Present if the client supports server-initiated elicitation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<HashMap<String, Value>>,

    /// Present if the client supports listing roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Experimental, non-standard capabilities that the client supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// Resources capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourcesCapability {
    /// Whether this server supports `resources/subscribe`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Whether this server emits `notifications/resources/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "listChanged")]
    pub list_changed: Option<bool>,
}

/// Prompts capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct PromptsCapability {
    /// Whether this server emits `notifications/prompts/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "listChanged")]
    pub list_changed: Option<bool>,
}

/// Tools capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ToolsCapability {
    /// Whether this server emits `notifications/tools/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "listChanged")]
    pub list_changed: Option<bool>,
}

/// Capabilities that a server may support.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ServerCapabilities {
    /// Present if the server offers any resources to read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Present if the server offers any prompt templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Present if the server offers any tools to call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Present if the server supports `logging/setLevel` and
    /// `notifications/message`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<HashMap<String, Value>>,

    /// Experimental, non-standard capabilities that the server supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InitializeParams {
    /// The latest protocol revision the client supports.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// The client's capabilities.
    pub capabilities: ClientCapabilities,

    /// Information about the client.
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// The server's reply to `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InitializeResult {
    /// The protocol revision the server wants to use.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// The server's capabilities.
    pub capabilities: ServerCapabilities,

    /// Information about the server.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Instructions describing how to use the server and its features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
