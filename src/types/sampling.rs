//! Server-initiated LLM sampling (`sampling/createMessage`).

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use crate::types::content::{ ImageContent, Role, TextContent };

/// Content types for sampling messages.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SamplingContent {
    Text(TextContent),
    Image(ImageContent),
}

/// Describes a message issued to or received from an LLM API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SamplingMessage {
    /// The role of the message sender.
    pub role: Role,

    /// The content of the message.
    pub content: SamplingContent,
}

/// A hint for model selection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ModelHint {
    /// A hint for a model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The server's preferences for model selection, requested of the client
/// during sampling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ModelPreferences {
    /// How much to prioritize sampling speed when selecting a model.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "speedPriority")]
    pub speed_priority: Option<f64>,

    /// How much to prioritize intelligence and capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "intelligencePriority")]
    pub intelligence_priority: Option<f64>,

    /// How much to prioritize cost when selecting a model.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "costPriority")]
    pub cost_priority: Option<f64>,

    /// Optional hints to use for model selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
}

/// Parameters of a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateMessageParams {
    /// The messages to use for sampling.
    pub messages: Vec<SamplingMessage>,

    /// The maximum number of tokens to sample.
    #[serde(rename = "maxTokens")]
    pub max_tokens: i64,

    /// A request to include context from one or more MCP servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "includeContext")]
    pub include_context: Option<String>,

    /// The server's preferences for which model to select.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "modelPreferences")]
    pub model_preferences: Option<ModelPreferences>,

    /// An optional system prompt the server wants to use for sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemPrompt")]
    pub system_prompt: Option<String>,

    /// The temperature to use for sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Optional stop sequences to use for sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "stopSequences")]
    pub stop_sequences: Option<Vec<String>>,

    /// Optional metadata to pass through to the LLM provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// The client's response to a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateMessageResult {
    /// The role of the message.
    pub role: Role,

    /// The content of the message.
    pub content: SamplingContent,

    /// The name of the model that generated the message.
    pub model: String,

    /// The reason why sampling stopped, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "stopReason")]
    pub stop_reason: Option<String>,
}
