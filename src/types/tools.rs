//! Tool definitions and the `tools/list` / `tools/call` payloads.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use crate::types::content::Content;

/// A JSON Schema object defining the expected parameters for a tool.
///
/// The schema is carried as raw JSON; this crate does not validate tool
/// arguments against it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolInputSchema {
    /// The type of the input (always "object").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The properties of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,

    /// The required properties of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolInputSchema {
    /// An object schema with the given properties and required list.
    pub fn object(properties: HashMap<String, Value>, required: Vec<String>) -> Self {
        Self {
            type_field: "object".to_string(),
            properties: Some(properties),
            required: if required.is_empty() { None } else { Some(required) },
        }
    }

    /// A schema accepting any object.
    pub fn any() -> Self {
        Self { type_field: "object".to_string(), properties: None, required: None }
    }
}

/// Behavioral hints about a tool, advisory only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ToolAnnotations {
    /// A human-readable title for the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The tool does not modify its environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "readOnlyHint")]
    pub read_only_hint: Option<bool>,

    /// The tool may perform destructive updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "destructiveHint")]
    pub destructive_hint: Option<bool>,

    /// Calling the tool repeatedly with the same arguments has no
    /// additional effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "idempotentHint")]
    pub idempotent_hint: Option<bool>,

    /// The tool may interact with entities outside its server.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "openWorldHint")]
    pub open_world_hint: Option<bool>,
}

/// Definition for a tool the client can call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Tool {
    /// The name of the tool.
    pub name: String,

    /// A human-readable description of the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// A JSON Schema object defining the expected parameters for the tool.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,

    /// Optional behavioral hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

/// Parameters of a `tools/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ListToolsParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// The server's response to a `tools/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListToolsResult {
    /// The list of tools.
    pub tools: Vec<Tool>,

    /// Pagination position after the last returned result.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallToolParams {
    /// The name of the tool to call.
    pub name: String,

    /// The arguments to pass to the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, Value>>,
}

/// The server's response to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallToolResult {
    /// The content returned by the tool.
    pub content: Vec<Content>,

    /// Whether the tool call ended in an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "isError")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// A successful result wrapping one text block.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self { content: vec![Content::text(text)], is_error: None }
    }

    /// A tool-level failure carrying an error description for the model.
    pub fn error<S: Into<String>>(text: S) -> Self {
        Self { content: vec![Content::text(text)], is_error: Some(true) }
    }
}
