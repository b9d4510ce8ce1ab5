//! Socket server protocol message types
//!
//! Every frame in either direction is one JSON envelope:
//!
//! ```json
//! {"id": "6f1c...", "type": "log-change", "timestamp": 1760000000000, "data": {...}}
//! ```
//!
//! Responses and errors also carry `correlationId`, the `id` of the request
//! they answer. Outbound messages are built with the factory functions on
//! [`Message`]; inbound frames are decoded with [`decode_client_frame`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Closed set of envelope types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Connection,
    StatusUpdate,
    ConfigChange,
    LogAdded,
    LogChange,
    LogRemoved,
    ProjectConfigChange,
    Subscribed,
    Unsubscribed,
    Pong,
    Response,
    Error,
    /// `custom-<name>-<fsEvent>`
    Custom(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Connection => "connection",
            MessageType::StatusUpdate => "status-update",
            MessageType::ConfigChange => "config-change",
            MessageType::LogAdded => "log-added",
            MessageType::LogChange => "log-change",
            MessageType::LogRemoved => "log-removed",
            MessageType::ProjectConfigChange => "project-config-change",
            MessageType::Subscribed => "subscribed",
            MessageType::Unsubscribed => "unsubscribed",
            MessageType::Pong => "pong",
            MessageType::Response => "response",
            MessageType::Error => "error",
            MessageType::Custom(name) => name,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "connection" => MessageType::Connection,
            "status-update" => MessageType::StatusUpdate,
            "config-change" => MessageType::ConfigChange,
            "log-added" => MessageType::LogAdded,
            "log-change" => MessageType::LogChange,
            "log-removed" => MessageType::LogRemoved,
            "project-config-change" => MessageType::ProjectConfigChange,
            "subscribed" => MessageType::Subscribed,
            "unsubscribed" => MessageType::Unsubscribed,
            "pong" => MessageType::Pong,
            "response" => MessageType::Response,
            "error" => MessageType::Error,
            other => MessageType::Custom(other.to_string()),
        })
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_else(|never| match never {}))
    }
}

/// Delivery priority. HIGH skips rate limiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn is_normal(&self) -> bool {
        *self == Priority::Normal
    }
}

/// Stable error codes carried in `error` envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    InvalidMessage,
    RequestFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::RequestFailed => "REQUEST_FAILED",
        }
    }
}

/// Message envelope. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Priority::is_normal")]
    pub priority: Priority,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Message {
    /// Build an envelope with a fresh id and the current time
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp: now_millis(),
            data,
            correlation_id: None,
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Welcome frame sent on accept
    pub fn connection(client_id: &str, channels: &[&str]) -> Self {
        Self::new(
            MessageType::Connection,
            json!({
                "clientId": client_id,
                "serverTime": now_millis(),
                "channels": channels,
            }),
        )
    }

    pub fn status_update(status: &str, details: Value) -> Self {
        Self::new(
            MessageType::StatusUpdate,
            json!({ "status": status, "details": details }),
        )
    }

    pub fn config_change(data: Value) -> Self {
        Self::new(MessageType::ConfigChange, data)
    }

    pub fn project_config_change(data: Value) -> Self {
        Self::new(MessageType::ProjectConfigChange, data)
    }

    pub fn log_added(data: Value) -> Self {
        Self::new(MessageType::LogAdded, data)
    }

    pub fn log_change(data: Value) -> Self {
        Self::new(MessageType::LogChange, data)
    }

    pub fn log_removed(data: Value) -> Self {
        Self::new(MessageType::LogRemoved, data)
    }

    pub fn custom(type_name: String, data: Value) -> Self {
        Self::new(MessageType::Custom(type_name), data)
    }

    pub fn subscribed(channel: &str) -> Self {
        Self::new(MessageType::Subscribed, json!({ "channel": channel }))
    }

    pub fn unsubscribed(channel: &str) -> Self {
        Self::new(MessageType::Unsubscribed, json!({ "channel": channel }))
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, json!({ "timestamp": now_millis() }))
    }

    /// Successful answer to a request
    pub fn response(correlation_id: Option<String>, request_type: &str, data: Value) -> Self {
        Self::new(
            MessageType::Response,
            json!({
                "requestType": request_type,
                "success": true,
                "data": data,
            }),
        )
        .with_correlation(correlation_id)
    }

    /// Error envelope; always HIGH priority
    pub fn error(code: ErrorCode, message: &str, correlation_id: Option<String>) -> Self {
        Self::new(
            MessageType::Error,
            json!({ "code": code, "message": message }),
        )
        .with_correlation(correlation_id)
        .with_priority(Priority::High)
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority == Priority::High
    }

    /// Serialize for the wire
    pub fn to_json(&self) -> String {
        // Envelopes hold only strings, numbers and JSON values; this cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize {} message: {}", self.kind, e);
            String::from("{}")
        })
    }
}

// ============================================================================
// Inbound frames
// ============================================================================

/// Decoded client-to-server frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
    Request(RequestFrame),
}

/// Application-level request delegated to the request handler
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    /// Envelope id, echoed as `correlationId`
    pub id: Option<String>,
    pub request_type: String,
    pub params: Value,
}

/// A frame that could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl DecodeError {
    fn invalid(message: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            code: ErrorCode::InvalidMessage,
            message: message.into(),
            correlation_id,
        }
    }

    pub fn into_message(self) -> Message {
        Message::error(self.code, &self.message, self.correlation_id)
    }
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame from a client
pub fn decode_client_frame(text: &str) -> Result<ClientFrame, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError {
        code: ErrorCode::ParseError,
        message: format!("Invalid JSON: {}", e),
        correlation_id: None,
    })?;
    let envelope: InboundEnvelope = serde_json::from_value(value)
        .map_err(|e| DecodeError::invalid(format!("Message must be a JSON object: {}", e), None))?;

    let id = envelope.id.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let kind = match envelope.kind {
        Some(Value::String(kind)) => kind,
        Some(_) => return Err(DecodeError::invalid("Message type must be a string", id)),
        None => return Err(DecodeError::invalid("Message type is required", id)),
    };

    match kind.as_str() {
        "subscribe" | "unsubscribe" => {
            let channel = envelope
                .data
                .get("channel")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| DecodeError::invalid(format!("{} requires data.channel", kind), id.clone()))?
                .to_string();
            if kind == "subscribe" {
                Ok(ClientFrame::Subscribe { channel })
            } else {
                Ok(ClientFrame::Unsubscribe { channel })
            }
        }
        "ping" => Ok(ClientFrame::Ping),
        "request" => {
            let request_type = envelope
                .data
                .get("requestType")
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError::invalid("request requires data.requestType", id.clone()))?
                .to_string();
            let params = envelope.data.get("params").cloned().unwrap_or(Value::Null);
            Ok(ClientFrame::Request(RequestFrame {
                id,
                request_type,
                params,
            }))
        }
        other => Err(DecodeError::invalid(
            format!("Unknown message type: {}", other),
            id,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let msg = Message::log_added(json!({"filename": "app.log"}));
        let wire: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(wire["type"], "log-added");
        assert_eq!(wire["data"]["filename"], "app.log");
        assert!(wire["id"].as_str().is_some());
        assert!(wire["timestamp"].as_i64().is_some());
        assert!(wire.get("correlationId").is_none());
        assert!(wire.get("priority").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::pong();
        let b = Message::pong();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_error_is_high_priority_with_correlation() {
        let msg = Message::error(ErrorCode::RequestFailed, "boom", Some("req-1".to_string()));
        assert!(msg.is_high_priority());
        let wire: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(wire["data"]["code"], "REQUEST_FAILED");
        assert_eq!(wire["correlationId"], "req-1");
        assert_eq!(wire["priority"], "high");
    }

    #[test]
    fn test_response_wraps_success() {
        let msg = Message::response(Some("abc".to_string()), "getStats", json!({"n": 1}));
        assert_eq!(msg.kind, MessageType::Response);
        assert_eq!(msg.data["success"], true);
        assert_eq!(msg.data["data"]["n"], 1);
        assert_eq!(msg.correlation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_custom_type_survives_deserialize() {
        let msg = Message::custom("custom-builds-add".to_string(), json!({}));
        let back: Message = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(back.kind, MessageType::Custom("custom-builds-add".to_string()));
        assert_eq!(back, msg);
    }

    #[test]
    fn test_decode_parse_error() {
        let err = decode_client_frame("{not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        assert!(err.correlation_id.is_none());
    }

    #[test]
    fn test_decode_missing_type() {
        let err = decode_client_frame(r#"{"id": "r1", "data": {}}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessage);
        assert_eq!(err.correlation_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode_client_frame(r#"{"type": "dance"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessage);
        assert!(err.message.contains("dance"));
    }

    #[test]
    fn test_decode_non_object() {
        let err = decode_client_frame("[1, 2]").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessage);
    }

    #[test]
    fn test_decode_subscribe() {
        let frame = decode_client_frame(r#"{"type":"subscribe","data":{"channel":"logs"}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                channel: "logs".to_string()
            }
        );
        let err = decode_client_frame(r#"{"type":"subscribe","data":{}}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessage);
    }

    #[test]
    fn test_decode_request() {
        let frame = decode_client_frame(
            r#"{"id":"q7","type":"request","data":{"requestType":"getLogs","params":{"limit":5}}}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::Request(req) => {
                assert_eq!(req.id.as_deref(), Some("q7"));
                assert_eq!(req.request_type, "getLogs");
                assert_eq!(req.params["limit"], 5);
            }
            other => panic!("Expected Request, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ping() {
        assert_eq!(decode_client_frame(r#"{"type":"ping"}"#).unwrap(), ClientFrame::Ping);
    }
}
