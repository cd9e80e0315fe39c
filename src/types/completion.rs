//! Argument completion (`completion/complete`).

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Identifies a prompt for completion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptReference {
    /// The type of reference (always "ref/prompt").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The name of the prompt or prompt template.
    pub name: String,
}

/// Identifies a resource or resource template for completion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceReference {
    /// The type of reference (always "ref/resource").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The URI or URI template of the resource.
    pub uri: String,
}

/// A reference for completion, either a prompt or a resource.
///
/// Unknown reference kinds are preserved verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Reference {
    Prompt(PromptReference),
    Resource(ResourceReference),
    Unknown(Value),
}

impl Reference {
    /// A `ref/prompt` reference.
    pub fn prompt<N: Into<String>>(name: N) -> Self {
        Reference::Prompt(PromptReference {
            type_field: "ref/prompt".to_string(),
            name: name.into(),
        })
    }

    /// A `ref/resource` reference.
    pub fn resource<U: Into<String>>(uri: U) -> Self {
        Reference::Resource(ResourceReference {
            type_field: "ref/resource".to_string(),
            uri: uri.into(),
        })
    }
}

/// The argument under completion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompleteArgument {
    /// The name of the argument.
    pub name: String,

    /// The value of the argument to use for completion matching.
    pub value: String,
}

/// Parameters of a `completion/complete` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompleteParams {
    /// The reference to complete against.
    #[serde(rename = "ref")]
    pub ref_: Reference,

    /// The argument's information.
    pub argument: CompleteArgument,
}

/// Completion values for one argument.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompletionInfo {
    /// An array of completion values.
    pub values: Vec<String>,

    /// The total number of completion options available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,

    /// Indicates whether there are additional completion options.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "hasMore")]
    pub has_more: Option<bool>,
}

/// The server's response to a `completion/complete` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompleteResult {
    /// The completion information.
    pub completion: CompletionInfo,
}
