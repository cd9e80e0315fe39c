//! Error types for the MCP runtime.
//!
//! This module defines the crate-wide [`Error`] enum covering the failure
//! modes the protocol engine distinguishes (peer errors, timeouts,
//! cancellation, disconnects, capability violations, transport and framing
//! failures), together with the JSON-RPC error payload types that cross the
//! wire.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Parse error
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Application-defined error range start
    pub const SERVER_ERROR_START: i64 = -32099;
    /// Application-defined error range end
    pub const SERVER_ERROR_END: i64 = -32000;
    /// Requested resource is not present on the server
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
}

/// A JSON-RPC error code.
///
/// The five reserved codes get named variants; everything else round-trips
/// through [`ErrorCode::Other`] as a bare integer so unknown peer codes are
/// preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Other(i64),
}

impl ErrorCode {
    /// The numeric wire value of this code.
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => error_codes::PARSE_ERROR,
            ErrorCode::InvalidRequest => error_codes::INVALID_REQUEST,
            ErrorCode::MethodNotFound => error_codes::METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => error_codes::INVALID_PARAMS,
            ErrorCode::InternalError => error_codes::INTERNAL_ERROR,
            ErrorCode::Other(code) => code,
        }
    }

    /// Map a numeric wire value back onto this enum.
    pub const fn from_code(code: i64) -> Self {
        match code {
            error_codes::PARSE_ERROR => ErrorCode::ParseError,
            error_codes::INVALID_REQUEST => ErrorCode::InvalidRequest,
            error_codes::METHOD_NOT_FOUND => ErrorCode::MethodNotFound,
            error_codes::INVALID_PARAMS => ErrorCode::InvalidParams,
            error_codes::INTERNAL_ERROR => ErrorCode::InternalError,
            other => ErrorCode::Other(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Ok(ErrorCode::from_code(code))
    }
}

impl JsonSchema for ErrorCode {
    fn schema_name() -> String {
        "ErrorCode".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <i64 as JsonSchema>::json_schema(gen)
    }
}

/// Error payload of a JSON-RPC error response
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorData {
    /// Error code
    pub code: ErrorCode,
    /// Short description of the error
    pub message: String,
    /// Additional information about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorData {
    /// Create an error payload from a code and message.
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

/// The main error type for the MCP runtime
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failures on start/send/close
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer answered a request with a JSON-RPC error
    #[error("Protocol error {code}: {message}")]
    Protocol {
        code: ErrorCode,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The request deadline elapsed without a response
    #[error("Request timed out")]
    RequestTimeout,

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// The transport closed while the request was pending
    #[error("Transport disconnected")]
    Disconnected,

    /// A local capability gate rejected the method before any I/O
    #[error("Capability error: {0}")]
    Capability(String),

    /// Unparseable bytes past the framing recovery rule
    #[error("Framing error: {0}")]
    Framing(String),

    /// The initialization handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Operation attempted in an invalid state (e.g. send before start)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// A `MethodNotFound` protocol error for the given method.
    pub fn method_not_found<S: std::fmt::Display>(method: S) -> Self {
        Error::Protocol {
            code: ErrorCode::MethodNotFound,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// An `InvalidParams` protocol error with the given message.
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Error::Protocol {
            code: ErrorCode::InvalidParams,
            message: message.into(),
            data: None,
        }
    }

    /// An `InvalidRequest` protocol error with the given message.
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Error::Protocol {
            code: ErrorCode::InvalidRequest,
            message: message.into(),
            data: None,
        }
    }

    /// An application-range protocol error.
    pub fn application<S: Into<String>>(code: i64, message: S) -> Self {
        Error::Protocol {
            code: ErrorCode::from_code(code),
            message: message.into(),
            data: None,
        }
    }

    /// The JSON-RPC payload this error maps onto when a handler reports it
    /// back to the peer.
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Error::Protocol { code, message, data } =>
                ErrorData { code: *code, message: message.clone(), data: data.clone() },
            Error::Json(e) => ErrorData::new(ErrorCode::ParseError, e.to_string()),
            other => ErrorData::new(ErrorCode::InternalError, other.to_string()),
        }
    }
}

impl From<ErrorData> for Error {
    fn from(payload: ErrorData) -> Self {
        Error::Protocol {
            code: payload.code,
            message: payload.message,
            data: payload.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_unknown_values() {
        let json = "-32042";
        let code: ErrorCode = serde_json::from_str(json).unwrap();
        assert_eq!(code, ErrorCode::Other(-32042));
        assert_eq!(serde_json::to_string(&code).unwrap(), json);
    }

    #[test]
    fn reserved_codes_map_to_named_variants() {
        assert_eq!(ErrorCode::from_code(-32601), ErrorCode::MethodNotFound);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::from_code(-32700), ErrorCode::ParseError);
    }

    #[test]
    fn protocol_error_preserves_payload() {
        let err = Error::Protocol {
            code: ErrorCode::Other(-32001),
            message: "backend unavailable".to_string(),
            data: Some(serde_json::json!({ "retryAfter": 5 })),
        };
        let payload = err.to_error_data();
        assert_eq!(payload.code, ErrorCode::Other(-32001));
        assert_eq!(payload.data.unwrap()["retryAfter"], 5);
    }
}
