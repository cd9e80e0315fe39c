//! Server-to-client log messages and the `logging/setLevel` request.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// The severity of a log message, based on RFC-5424 syslog severities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// Parameters of a `logging/setLevel` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetLevelParams {
    /// The level of logging that the client wants to receive.
    pub level: LoggingLevel,
}

/// Parameters of a `notifications/message` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingMessageParams {
    /// The severity of this log message.
    pub level: LoggingLevel,

    /// The data to be logged.
    pub data: Value,

    /// An optional name of the logger issuing this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(LoggingLevel::Debug < LoggingLevel::Warning);
        assert!(LoggingLevel::Error < LoggingLevel::Emergency);
    }

    #[test]
    fn levels_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&LoggingLevel::Warning).unwrap(), "\"warning\"");
    }
}
