//! Content blocks exchanged in prompts, tool results and sampling messages.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// The sender or recipient of messages and data in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// Optional annotations for the client to inform how objects are used or
/// displayed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Annotations {
    /// Describes who the intended customer of this object or data is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,

    /// How important this data is for operating the server, from 0 (entirely
    /// optional) to 1 (effectively required).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// Text provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextContent {
    /// The type of content (always "text").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The text content of the message.
    pub text: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// An image provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageContent {
    /// The type of content (always "image").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The base64-encoded image data.
    pub data: String,

    /// The MIME type of the image.
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Audio provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AudioContent {
    /// The type of content (always "audio").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The base64-encoded audio data.
    pub data: String,

    /// The MIME type of the audio.
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// The contents of a resource that is text-based.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// The text of the item.
    pub text: String,

    /// The MIME type of this resource, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// The contents of a resource that is binary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlobResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// A base64-encoded string representing the binary data of the item.
    pub blob: String,

    /// The MIME type of this resource, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// The content of a resource, which can be either text or binary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ResourceContentType {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

impl ResourceContentType {
    /// Text contents for a URI.
    pub fn text<U: Into<String>, T: Into<String>>(uri: U, text: T) -> Self {
        ResourceContentType::Text(TextResourceContents {
            uri: uri.into(),
            text: text.into(),
            mime_type: None,
        })
    }

    /// Binary contents for a URI, encoding the bytes as base64.
    pub fn blob<U: Into<String>>(uri: U, bytes: &[u8], mime_type: Option<String>) -> Self {
        use base64::Engine as _;
        ResourceContentType::Blob(BlobResourceContents {
            uri: uri.into(),
            blob: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type,
        })
    }
}

/// The contents of a resource, embedded into a prompt or tool call result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddedResource {
    /// The type of content (always "resource").
    #[serde(rename = "type")]
    pub type_field: String,

    /// The resource content.
    pub resource: ResourceContentType,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Content that can be included in messages.
///
/// The trailing [`Content::Unknown`] variant preserves content blocks whose
/// `type` tag this crate does not know, so newer peers round-trip cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Content {
    Text(TextContent),
    Image(ImageContent),
    Audio(AudioContent),
    Resource(EmbeddedResource),
    Unknown(Value),
}

impl Content {
    /// Plain text content.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent {
            type_field: "text".to_string(),
            text: text.into(),
            annotations: None,
        })
    }

    /// Base64 image content.
    pub fn image<D: Into<String>, M: Into<String>>(data: D, mime_type: M) -> Self {
        Content::Image(ImageContent {
            type_field: "image".to_string(),
            data: data.into(),
            mime_type: mime_type.into(),
            annotations: None,
        })
    }

    /// Embedded resource content.
    pub fn resource(resource: ResourceContentType) -> Self {
        Content::Resource(EmbeddedResource {
            type_field: "resource".to_string(),
            resource,
            annotations: None,
        })
    }
}
