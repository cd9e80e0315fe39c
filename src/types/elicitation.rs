//! Server-initiated user input requests (`elicitation/create`).

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Parameters of an `elicitation/create` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ElicitationCreateParams {
    /// The message to present to the user.
    pub message: String,

    /// A restricted JSON Schema describing the requested input shape,
    /// carried as raw JSON.
    #[serde(rename = "requestedSchema")]
    pub requested_schema: Value,
}

/// How the user responded to an elicitation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    /// The user submitted the form.
    Accept,
    /// The user explicitly declined.
    Decline,
    /// The user dismissed without an explicit choice.
    Cancel,
}

/// The client's response to an `elicitation/create` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ElicitationResult {
    /// The user's action.
    pub action: ElicitationAction,

    /// The submitted form content, present only on accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<HashMap<String, Value>>,
}
