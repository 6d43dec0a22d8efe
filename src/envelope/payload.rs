//! Typed payloads carried by envelopes.
//!
//! Every payload variant implies its message kind, so a stage can only build
//! an envelope whose payload has the shape its kind promises.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Message kinds exchanged between stages. Serialized as the upper-case
/// names used in the `type` field of the transport form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Query,
    RetrievalResult,
    FinalResponse,
    Success,
    Error,
    CreationError,
    ConversionError,
    Custom(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Query => "QUERY",
            MessageKind::RetrievalResult => "RETRIEVAL_RESULT",
            MessageKind::FinalResponse => "FINAL_RESPONSE",
            MessageKind::Success => "SUCCESS",
            MessageKind::Error => "ERROR",
            MessageKind::CreationError => "CREATION_ERROR",
            MessageKind::ConversionError => "CONVERSION_ERROR",
            MessageKind::Custom(name) => name,
        }
    }

    /// Map a wire name to a kind. Unknown names become `Custom`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "QUERY" => MessageKind::Query,
            "RETRIEVAL_RESULT" => MessageKind::RetrievalResult,
            "FINAL_RESPONSE" => MessageKind::FinalResponse,
            "SUCCESS" => MessageKind::Success,
            "ERROR" => MessageKind::Error,
            "CREATION_ERROR" => MessageKind::CreationError,
            "CONVERSION_ERROR" => MessageKind::ConversionError,
            other => MessageKind::Custom(other.to_string()),
        }
    }

    /// Reserved error kinds.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MessageKind::Error | MessageKind::CreationError | MessageKind::ConversionError
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query: String,
}

impl QueryPayload {
    /// Validate the `query` field of an inbound payload.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, PayloadError> {
        let Some(raw) = fields.get("query") else {
            return Err(PayloadError::MissingField("query".to_string()));
        };
        let Some(query) = raw.as_str() else {
            return Err(PayloadError::InvalidField {
                field: "query".to_string(),
                reason: "must be a string".to_string(),
            });
        };
        if query.trim().is_empty() {
            return Err(PayloadError::InvalidField {
                field: "query".to_string(),
                reason: "must be a non-empty string".to_string(),
            });
        }
        Ok(Self {
            query: query.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResultPayload {
    pub retrieved_context: Vec<String>,
    pub query: String,
    pub num_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalErrorPayload {
    pub retrieved_context: Vec<String>,
    pub query: String,
    pub error: String,
    pub error_type: String,
}

/// Shape shared by `FINAL_RESPONSE` and the response stage's `ERROR`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: String,
    pub source_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default = "default_error_type")]
    pub error_type: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub status: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationErrorPayload {
    pub error: String,
    pub original_params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionErrorPayload {
    pub error: String,
}

fn default_error_type() -> String {
    "Error".to_string()
}

fn default_severity() -> String {
    "ERROR".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Query(QueryPayload),
    RetrievalResult(RetrievalResultPayload),
    RetrievalError(RetrievalErrorPayload),
    FinalResponse(AnswerPayload),
    ResponseError(AnswerPayload),
    Error(ErrorPayload),
    Success(SuccessPayload),
    CreationError(CreationErrorPayload),
    ConversionError(ConversionErrorPayload),
    Custom { kind: String, fields: Map<String, Value> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload must contain '{0}' key")]
    MissingField(String),
    #[error("payload field '{field}' {reason}")]
    InvalidField { field: String, reason: String },
    #[error("payload must be a structured map")]
    NotAnObject,
    #[error("invalid payload for {kind}: {message}")]
    Malformed { kind: String, message: String },
}

impl PayloadError {
    pub fn error_type(&self) -> &'static str {
        match self {
            PayloadError::MissingField(_) => "MissingField",
            PayloadError::InvalidField { .. } => "InvalidField",
            PayloadError::NotAnObject => "InvalidPayload",
            PayloadError::Malformed { .. } => "InvalidPayload",
        }
    }
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Query(_) => MessageKind::Query,
            Payload::RetrievalResult(_) => MessageKind::RetrievalResult,
            Payload::RetrievalError(_) | Payload::ResponseError(_) | Payload::Error(_) => {
                MessageKind::Error
            }
            Payload::FinalResponse(_) => MessageKind::FinalResponse,
            Payload::Success(_) => MessageKind::Success,
            Payload::CreationError(_) => MessageKind::CreationError,
            Payload::ConversionError(_) => MessageKind::ConversionError,
            Payload::Custom { kind, .. } => MessageKind::parse(kind),
        }
    }

    /// Parse a map received for `kind` into the matching typed payload.
    ///
    /// `ERROR` payloads are told apart by their keys: retrieval errors carry
    /// `retrieved_context`, response errors carry `answer`.
    pub fn from_fields(kind: &MessageKind, fields: Map<String, Value>) -> Result<Self, PayloadError> {
        match kind {
            MessageKind::Query => QueryPayload::from_fields(&fields).map(Payload::Query),
            MessageKind::RetrievalResult => {
                decode(kind, fields).map(Payload::RetrievalResult)
            }
            MessageKind::FinalResponse => decode(kind, fields).map(Payload::FinalResponse),
            MessageKind::Success => decode(kind, fields).map(Payload::Success),
            MessageKind::CreationError => decode(kind, fields).map(Payload::CreationError),
            MessageKind::ConversionError => decode(kind, fields).map(Payload::ConversionError),
            MessageKind::Error if fields.contains_key("retrieved_context") => {
                decode(kind, fields).map(Payload::RetrievalError)
            }
            MessageKind::Error if fields.contains_key("answer") => {
                decode(kind, fields).map(Payload::ResponseError)
            }
            MessageKind::Error => decode(kind, fields).map(Payload::Error),
            MessageKind::Custom(name) => Ok(Payload::Custom {
                kind: name.clone(),
                fields,
            }),
        }
    }

    pub fn from_value(kind: &MessageKind, value: Value) -> Result<Self, PayloadError> {
        match value {
            Value::Object(fields) => Self::from_fields(kind, fields),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    /// Render the payload as the structured map used on the wire.
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            Payload::Query(inner) => serde_json::to_value(inner)?,
            Payload::RetrievalResult(inner) => serde_json::to_value(inner)?,
            Payload::RetrievalError(inner) => serde_json::to_value(inner)?,
            Payload::FinalResponse(inner) | Payload::ResponseError(inner) => {
                serde_json::to_value(inner)?
            }
            Payload::Error(inner) => serde_json::to_value(inner)?,
            Payload::Success(inner) => serde_json::to_value(inner)?,
            Payload::CreationError(inner) => serde_json::to_value(inner)?,
            Payload::ConversionError(inner) => serde_json::to_value(inner)?,
            Payload::Custom { fields, .. } => return Ok(fields.clone()),
        };
        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "payload serialized to a non-object value: {}",
                other
            ))),
        }
    }
}

fn decode<T: DeserializeOwned>(kind: &MessageKind, fields: Map<String, Value>) -> Result<T, PayloadError> {
    serde_json::from_value(Value::Object(fields)).map_err(|err| {
        let message = err.to_string();
        let missing = message
            .strip_prefix("missing field `")
            .and_then(|rest| rest.split('`').next())
            .map(str::to_string);
        match missing {
            Some(field) => PayloadError::MissingField(field),
            None => PayloadError::Malformed {
                kind: kind.to_string(),
                message,
            },
        }
    })
}
