//! Resource descriptors and the `resources/*` payloads.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };

use crate::types::content::{ Annotations, ResourceContentType };

/// A known resource that the server is capable of reading.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    /// The URI of this resource.
    pub uri: String,

    /// A human-readable name for this resource.
    pub name: String,

    /// A description of what this resource represents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The MIME type of this resource, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,

    /// The size of the raw resource content, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// A template description for resources available on the server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceTemplate {
    /// A URI template that can be used to construct resource URIs.
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    /// A human-readable name for the type of resource this template refers
    /// to.
    pub name: String,

    /// A description of what this template is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The MIME type for all resources that match this template.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Parameters of a `resources/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ListResourcesParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// The server's response to a `resources/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListResourcesResult {
    /// The list of resources.
    pub resources: Vec<Resource>,

    /// Pagination position after the last returned result.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Parameters of a `resources/templates/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ListResourceTemplatesParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// The server's response to a `resources/templates/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListResourceTemplatesResult {
    /// The list of resource templates.
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,

    /// Pagination position after the last returned result.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Parameters of a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadResourceParams {
    /// The URI of the resource to read.
    pub uri: String,
}

/// The server's response to a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadResourceResult {
    /// The contents of the resource.
    pub contents: Vec<ResourceContentType>,
}

/// Parameters of `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubscribeParams {
    /// The URI of the resource.
    pub uri: String,
}

/// Parameters of a `notifications/resources/updated` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceUpdatedParams {
    /// The URI of the resource that has been updated.
    pub uri: String,
}
