//! Method names of the MCP wire protocol.

/// Initialization handshake request.
pub const INITIALIZE: &str = "initialize";
/// Liveness check, answered by either peer.
pub const PING: &str = "ping";

/// List the server's tools.
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool by name.
pub const TOOLS_CALL: &str = "tools/call";

/// List the server's prompts.
pub const PROMPTS_LIST: &str = "prompts/list";
/// Fetch one prompt, templated with arguments.
pub const PROMPTS_GET: &str = "prompts/get";

/// List the server's concrete resources.
pub const RESOURCES_LIST: &str = "resources/list";
/// Read one resource by URI.
pub const RESOURCES_READ: &str = "resources/read";
/// List the server's resource templates.
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Ask for `notifications/resources/updated` for a URI.
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Stop update notifications for a URI.
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

/// Argument completion against a prompt or resource reference.
pub const COMPLETION_COMPLETE: &str = "completion/complete";
/// Adjust the level of `notifications/message` the server emits.
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Server-initiated LLM sampling via the client.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Server-initiated request for the client's roots.
pub const ROOTS_LIST: &str = "roots/list";
/// Server-initiated request for user input via the client.
pub const ELICITATION_CREATE: &str = "elicitation/create";

/// Sent by the client once the handshake completes.
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// Either peer cancelling a request it previously sent.
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// Incremental progress for a request carrying a progress token.
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
/// Server log message.
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
/// The server's tool list changed.
pub const NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// The server's prompt list changed.
pub const NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// The server's resource list changed.
pub const NOTIFICATION_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// A subscribed resource changed.
pub const NOTIFICATION_RESOURCES_UPDATED: &str = "notifications/resources/updated";
/// The client's roots list changed.
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
