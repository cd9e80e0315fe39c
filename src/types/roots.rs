//! Filesystem roots exposed by the client.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };

/// A root directory or file that the server can operate on.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Root {
    /// The URI identifying the root. This must start with `file://` for now.
    pub uri: String,

    /// An optional name for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    pub fn new<U: Into<String>>(uri: U, name: Option<String>) -> Self {
        Self { uri: uri.into(), name }
    }
}

/// The client's response to a `roots/list` request from the server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListRootsResult {
    /// The list of roots.
    pub roots: Vec<Root>,
}
