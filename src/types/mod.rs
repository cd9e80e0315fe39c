//! Typed MCP message payloads.
//!
//! These types mirror the protocol schema field for field; everything the
//! schema marks optional is an `Option` skipped when absent, and every
//! camelCase wire name is mapped with an explicit rename.

pub mod completion;
pub mod content;
pub mod elicitation;
pub mod initialize;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use completion::{
    CompleteArgument,
    CompleteParams,
    CompleteResult,
    CompletionInfo,
    PromptReference,
    Reference,
    ResourceReference,
};
pub use content::{
    Annotations,
    AudioContent,
    BlobResourceContents,
    Content,
    EmbeddedResource,
    ImageContent,
    ResourceContentType,
    Role,
    TextContent,
    TextResourceContents,
};
pub use elicitation::{ ElicitationAction, ElicitationCreateParams, ElicitationResult };
pub use initialize::{
    ClientCapabilities,
    Implementation,
    InitializeParams,
    InitializeResult,
    PromptsCapability,
    ResourcesCapability,
    RootsCapability,
    ServerCapabilities,
    ToolsCapability,
    LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
pub use logging::{ LoggingLevel, LoggingMessageParams, SetLevelParams };
pub use prompts::{
    GetPromptParams,
    GetPromptResult,
    ListPromptsParams,
    ListPromptsResult,
    Prompt,
    PromptArgument,
    PromptMessage,
};
pub use resources::{
    ListResourceTemplatesParams,
    ListResourceTemplatesResult,
    ListResourcesParams,
    ListResourcesResult,
    ReadResourceParams,
    ReadResourceResult,
    Resource,
    ResourceTemplate,
    ResourceUpdatedParams,
    SubscribeParams,
};
pub use roots::{ ListRootsResult, Root };
pub use sampling::{
    CreateMessageParams,
    CreateMessageResult,
    ModelHint,
    ModelPreferences,
    SamplingContent,
    SamplingMessage,
};
pub use tools::{
    CallToolParams,
    CallToolResult,
    ListToolsParams,
    ListToolsResult,
    Tool,
    ToolAnnotations,
    ToolInputSchema,
};
