//! Wire form of envelopes plus trace id and timestamp helpers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub const SYSTEM_SENDER: &str = "SYSTEM";
pub const ERROR_HANDLER: &str = "ERROR_HANDLER";

/// Wire form of an envelope, exactly as it travels between stages.
///
/// Fields default when absent so a malformed message can still be
/// deserialized and then rejected by the receiving stage with an
/// `ERROR` envelope instead of a transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub timestamp: String,
}

impl TransportMessage {
    /// All six fields present; identities and trace id non-blank; payload a map.
    pub fn is_valid(&self) -> bool {
        [&self.sender, &self.receiver, &self.kind, &self.trace_id, &self.timestamp]
            .iter()
            .all(|field| !field.trim().is_empty())
            && self.payload.is_object()
    }

    pub fn payload_fields(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }

    /// Trace id to propagate, `None` when the sender left it blank.
    pub fn trace(&self) -> Option<&str> {
        let trimmed = self.trace_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub(crate) fn conversion_error(error: impl std::fmt::Display) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            receiver: ERROR_HANDLER.to_string(),
            kind: "CONVERSION_ERROR".to_string(),
            trace_id: new_trace_id(),
            payload: json!({ "error": error.to_string() }),
            timestamp: now_timestamp(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// UTC wall-clock time, ISO-8601 with microseconds and a `Z` suffix.
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let msg = TransportMessage::from_json(r#"{"type": "QUERY"}"#).unwrap();

        assert_eq!(msg.kind, "QUERY");
        assert!(msg.sender.is_empty());
        assert!(msg.payload.is_null());
        assert!(!msg.is_valid());
        assert!(msg.trace().is_none());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let msg = TransportMessage {
            sender: "UI".into(),
            receiver: "RetrievalAgent".into(),
            kind: "QUERY".into(),
            trace_id: "t-1".into(),
            payload: json!({"query": "hi"}),
            timestamp: now_timestamp(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for expected in ["sender", "receiver", "type", "trace_id", "payload", "timestamp"] {
            assert!(keys.contains(&expected), "missing {}", expected);
        }
        assert!(msg.is_valid());
    }

    #[test]
    fn timestamp_is_utc_iso8601() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
