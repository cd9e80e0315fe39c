//! JSON-RPC 2.0 message envelope.
//!
//! Every MCP message is one of four JSON-RPC shapes: a request (carries an
//! `id` and expects a response), a notification (no `id`), a success
//! response, or an error response. [`JSONRPCMessage`] unifies them for the
//! transports and the engine; the typed MCP payloads live in [`crate::types`].

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use crate::errors::ErrorData;

/// The JSON-RPC version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A uniquely identifying ID for a request in JSON-RPC.
///
/// String and integer ids are distinct: `1` and `"1"` never collide in the
/// pending-request map.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// A progress token, used to associate progress notifications with the
/// original request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::String(s) => ProgressToken::String(s.clone()),
            RequestId::Number(n) => ProgressToken::Number(*n),
        }
    }
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::String(s) => write!(f, "{}", s),
            ProgressToken::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A JSON-RPC request that expects a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JSONRPCRequest {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID.
    pub id: RequestId,

    /// The method name.
    pub method: String,

    /// The request parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC notification which does not expect a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JSONRPCNotification {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The method name.
    pub method: String,

    /// The notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A successful JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JSONRPCResponse {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID this is responding to.
    pub id: RequestId,

    /// The response result.
    pub result: Value,
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JSONRPCError {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID this error is for. `None` is reserved for parse
    /// failures where no id could be read from the offending message.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: ErrorData,
}

/// Any JSON-RPC message type.
///
/// The untagged variant order matters: a request carries both `id` and
/// `method`, a notification only `method`, so request must be tried first.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

impl JSONRPCRequest {
    pub fn new<M: Into<String>>(id: RequestId, method: M, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl JSONRPCNotification {
    pub fn new<M: Into<String>>(method: M, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl JSONRPCMessage {
    /// Build a request message.
    pub fn request<M: Into<String>>(id: RequestId, method: M, params: Option<Value>) -> Self {
        JSONRPCMessage::Request(JSONRPCRequest::new(id, method, params))
    }

    /// Build a notification message.
    pub fn notification<M: Into<String>>(method: M, params: Option<Value>) -> Self {
        JSONRPCMessage::Notification(JSONRPCNotification::new(method, params))
    }

    /// Build a success response message.
    pub fn response(id: RequestId, result: Value) -> Self {
        JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    /// Build an error response message.
    pub fn error(id: Option<RequestId>, error: ErrorData) -> Self {
        JSONRPCMessage::Error(JSONRPCError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        })
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            JSONRPCMessage::Request(r) => Some(&r.method),
            JSONRPCMessage::Notification(n) => Some(&n.method),
            _ => None,
        }
    }
}

/// Parameters for a `notifications/progress` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressParams {
    /// The progress token from the initial request.
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,

    /// The progress thus far.
    pub progress: f64,

    /// Total number of items to process, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    /// A human-readable progress message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parameters for a `notifications/cancelled` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelledParams {
    /// The ID of the request being cancelled.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    /// An optional string describing the reason for the cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let msg = JSONRPCMessage::request(
            RequestId::Number(1),
            "tools/list",
            Some(json!({ "cursor": "abc" }))
        );
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: JSONRPCMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            JSONRPCMessage::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "tools/list");
                assert_eq!(req.params.unwrap()["cursor"], "abc");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn notification_has_no_id() {
        let decoded: JSONRPCMessage = serde_json
            ::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap();
        assert!(matches!(decoded, JSONRPCMessage::Notification(_)));
    }

    #[test]
    fn response_and_error_disambiguate() {
        let resp: JSONRPCMessage = serde_json
            ::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#)
            .unwrap();
        assert!(matches!(resp, JSONRPCMessage::Response(_)));

        let err: JSONRPCMessage = serde_json
            ::from_str(r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope"}}"#)
            .unwrap();
        match err {
            JSONRPCMessage::Error(e) => {
                assert_eq!(e.id, Some(RequestId::Number(7)));
                assert_eq!(e.error.code.code(), -32601);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn error_with_null_id_parses() {
        let err: JSONRPCMessage = serde_json
            ::from_str(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse"}}"#)
            .unwrap();
        match err {
            JSONRPCMessage::Error(e) => assert!(e.id.is_none()),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn request_id_variants_are_disjoint() {
        use std::collections::HashSet;
        let mut ids = HashSet::new();
        ids.insert(RequestId::Number(1));
        ids.insert(RequestId::String("1".to_string()));
        assert_eq!(ids.len(), 2);
    }
}
