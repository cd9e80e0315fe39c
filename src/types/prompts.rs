//! Prompt templates and the `prompts/list` / `prompts/get` payloads.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };

use crate::types::content::{ Content, Role };

/// Describes an argument that a prompt can accept.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptArgument {
    /// The name of the argument.
    pub name: String,

    /// A human-readable description of the argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether this argument must be provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A prompt or prompt template that the server offers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Prompt {
    /// The name of the prompt or prompt template.
    pub name: String,

    /// An optional description of what this prompt provides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// A list of arguments to use for templating the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Describes a message returned as part of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptMessage {
    /// The role of the message sender.
    pub role: Role,

    /// The content of the message.
    pub content: Content,
}

/// Parameters of a `prompts/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ListPromptsParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// The server's response to a `prompts/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListPromptsResult {
    /// The list of prompts.
    pub prompts: Vec<Prompt>,

    /// Pagination position after the last returned result.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Parameters of a `prompts/get` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetPromptParams {
    /// The name of the prompt or prompt template.
    pub name: String,

    /// Arguments to use for templating the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// The server's response to a `prompts/get` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetPromptResult {
    /// An optional description for the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The messages in the prompt.
    pub messages: Vec<PromptMessage>,
}
