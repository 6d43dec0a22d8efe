//! The envelope passed between pipeline stages.

use std::fmt;

use serde_json::{json, Map, Value};

use super::payload::{
    CreationErrorPayload, ErrorPayload, MessageKind, Payload, PayloadError, SuccessPayload,
};
use super::transport::{new_trace_id, now_timestamp, TransportMessage, ERROR_HANDLER, SYSTEM_SENDER};
use crate::core::errors::PipelineError;

/// An immutable inter-stage message.
///
/// Built once at a stage boundary; stages hand its transport form onward.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    sender: String,
    receiver: String,
    trace_id: String,
    payload: Payload,
    metadata: Option<Map<String, Value>>,
    timestamp: String,
}

impl Envelope {
    /// Strict constructor: identities must be non-blank after trimming.
    ///
    /// A blank or missing `trace_id` starts a new causal chain.
    pub fn try_create(
        sender: &str,
        receiver: &str,
        payload: Payload,
        trace_id: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let sender = require_identity("sender", sender)?;
        let receiver = require_identity("receiver", receiver)?;
        validate_kind(&payload)?;

        Ok(Self {
            sender,
            receiver,
            trace_id: resolve_trace_id(trace_id),
            payload,
            metadata: None,
            timestamp: now_timestamp(),
        })
    }

    /// Infallible constructor: an invalid envelope comes back as a
    /// `CREATION_ERROR` envelope describing what was wrong.
    pub fn create(sender: &str, receiver: &str, payload: Payload, trace_id: Option<&str>) -> Self {
        let kind = payload.kind();
        match Self::try_create(sender, receiver, payload, trace_id) {
            Ok(envelope) => {
                tracing::debug!("Envelope created: {} -> {} [{}]", sender.trim(), receiver.trim(), kind);
                envelope
            }
            Err(err) => Self::creation_error(&err, sender, receiver, kind.as_str(), trace_id),
        }
    }

    /// Untyped constructor from a wire kind name and a JSON payload.
    pub fn try_from_parts(
        sender: &str,
        receiver: &str,
        kind: &str,
        payload: Value,
        trace_id: Option<&str>,
    ) -> Result<Self, PipelineError> {
        if kind.trim().is_empty() {
            return Err(PipelineError::InvalidEnvelope(
                "type must be a non-empty string".to_string(),
            ));
        }
        let kind = MessageKind::parse(kind);
        let (payload, metadata) = split_metadata(payload)?;
        let payload = Payload::from_value(&kind, payload).map_err(invalid_payload)?;

        let mut envelope = Self::try_create(sender, receiver, payload, trace_id)?;
        envelope.metadata = metadata;
        Ok(envelope)
    }

    /// [`Envelope::try_from_parts`] with the `CREATION_ERROR` fallback.
    pub fn from_parts(
        sender: &str,
        receiver: &str,
        kind: &str,
        payload: Value,
        trace_id: Option<&str>,
    ) -> Self {
        Self::try_from_parts(sender, receiver, kind, payload, trace_id)
            .unwrap_or_else(|err| Self::creation_error(&err, sender, receiver, kind, trace_id))
    }

    /// Rebuild an envelope from its transport form, keeping its timestamp.
    pub fn from_transport(message: &TransportMessage) -> Result<Self, PipelineError> {
        let mut envelope = Self::try_from_parts(
            &message.sender,
            &message.receiver,
            &message.kind,
            message.payload.clone(),
            message.trace(),
        )?;
        if !message.timestamp.trim().is_empty() {
            envelope.timestamp = message.timestamp.clone();
        }
        Ok(envelope)
    }

    /// Generic `ERROR` envelope for a pipeline fault.
    pub fn error_message(
        error: &PipelineError,
        sender: &str,
        receiver: &str,
        trace_id: Option<&str>,
    ) -> Self {
        Self::create(
            sender,
            receiver,
            Payload::Error(ErrorPayload {
                error: error.to_string(),
                error_type: error.error_type().to_string(),
                severity: "ERROR".to_string(),
            }),
            trace_id,
        )
    }

    pub fn success_message(sender: &str, receiver: &str, data: Value, trace_id: Option<&str>) -> Self {
        Self::create(
            sender,
            receiver,
            Payload::Success(SuccessPayload {
                status: "success".to_string(),
                data,
            }),
            trace_id,
        )
    }

    fn creation_error(
        err: &PipelineError,
        sender: &str,
        receiver: &str,
        kind: &str,
        trace_id: Option<&str>,
    ) -> Self {
        tracing::warn!("Envelope creation failed: {}", err);
        Self {
            sender: SYSTEM_SENDER.to_string(),
            receiver: ERROR_HANDLER.to_string(),
            trace_id: resolve_trace_id(trace_id),
            payload: Payload::CreationError(CreationErrorPayload {
                error: err.to_string(),
                original_params: json!({
                    "sender": sender,
                    "receiver": receiver,
                    "type": kind,
                }),
            }),
            metadata: None,
            timestamp: now_timestamp(),
        }
    }

    /// Attach a metadata entry, emitted under `payload.metadata`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    /// Serialize to the wire form. A payload that cannot be rendered yields a
    /// `CONVERSION_ERROR` message instead of failing.
    pub fn to_transport_form(&self) -> TransportMessage {
        let mut fields = match self.payload.to_fields() {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!("Envelope conversion failed: {}", err);
                return TransportMessage::conversion_error(err);
            }
        };
        if let Some(metadata) = &self.metadata {
            fields.insert("metadata".to_string(), Value::Object(metadata.clone()));
        }

        TransportMessage {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            kind: self.kind().to_string(),
            trace_id: self.trace_id.clone(),
            payload: Value::Object(fields),
            timestamp: self.timestamp.clone(),
        }
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let payload_size = self
            .payload
            .to_fields()
            .map(|fields| Value::Object(fields).to_string().chars().count())
            .unwrap_or(0);
        let trace_prefix: String = self.trace_id.chars().take(8).collect();
        format!(
            "{} -> {} [{}] (payload: {} chars, trace: {}...)",
            self.sender,
            self.receiver,
            self.kind(),
            payload_size,
            trace_prefix
        )
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

fn require_identity(field: &str, value: &str) -> Result<String, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidEnvelope(format!(
            "{} must be a non-empty string",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_kind(payload: &Payload) -> Result<(), PipelineError> {
    let Payload::Custom { kind, .. } = payload else {
        return Ok(());
    };
    if kind.trim().is_empty() {
        return Err(PipelineError::InvalidEnvelope(
            "type must be a non-empty string".to_string(),
        ));
    }
    if !matches!(MessageKind::parse(kind), MessageKind::Custom(_)) {
        return Err(PipelineError::InvalidEnvelope(format!(
            "type {} is reserved and needs its typed payload",
            kind.trim()
        )));
    }
    Ok(())
}

fn resolve_trace_id(trace_id: Option<&str>) -> String {
    trace_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_trace_id)
}

fn split_metadata(payload: Value) -> Result<(Value, Option<Map<String, Value>>), PipelineError> {
    let Value::Object(mut fields) = payload else {
        return Err(invalid_payload(PayloadError::NotAnObject));
    };
    let metadata = match fields.remove("metadata") {
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            // not ours: leave a non-map `metadata` key in the payload
            fields.insert("metadata".to_string(), other);
            None
        }
        None => None,
    };
    Ok((Value::Object(fields), metadata))
}

fn invalid_payload(err: PayloadError) -> PipelineError {
    PipelineError::InvalidEnvelope(err.to_string())
}
