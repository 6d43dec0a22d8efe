use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Why a language-model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFailureKind {
    Authentication,
    Quota,
    Network,
    Provider,
}

impl std::fmt::Display for ModelFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ModelFailureKind::Authentication => "authentication",
            ModelFailureKind::Quota => "quota",
            ModelFailureKind::Network => "network",
            ModelFailureKind::Provider => "provider",
        };
        f.write_str(label)
    }
}

/// Failures raised inside the retrieval pipeline.
///
/// Stages never let these escape: they are rendered into `ERROR` envelopes,
/// using [`PipelineError::error_type`] as the stable `error_type` field.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("text extraction failed: {0}")]
    ExtractionFailure(String),
    #[error("failed to persist vector store: {0}")]
    IndexWrite(String),
    #[error("retrieval failed: {0}")]
    RetrievalFailure(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),
    #[error("model call failed ({kind}): {message}")]
    ModelCall {
        kind: ModelFailureKind,
        message: String,
    },
}

impl PipelineError {
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::InvalidEnvelope(_) => "InvalidEnvelope",
            PipelineError::UnsupportedFormat(_) => "UnsupportedFormat",
            PipelineError::ExtractionFailure(_) => "ExtractionFailure",
            PipelineError::IndexWrite(_) => "IndexWriteError",
            PipelineError::RetrievalFailure(_) => "RetrievalFailure",
            PipelineError::EmbeddingFailure(_) => "EmbeddingFailure",
            PipelineError::ModelCall { .. } => "ModelCallFailure",
        }
    }

    pub fn model_call(kind: ModelFailureKind, message: impl Into<String>) -> Self {
        PipelineError::ModelCall {
            kind,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidEnvelope(_) => ApiError::BadRequest(err.to_string()),
            PipelineError::UnsupportedFormat(_) => ApiError::UnsupportedMediaType(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_names_are_stable() {
        assert_eq!(
            PipelineError::IndexWrite("disk full".into()).error_type(),
            "IndexWriteError"
        );
        assert_eq!(
            PipelineError::model_call(ModelFailureKind::Quota, "slow down").error_type(),
            "ModelCallFailure"
        );
    }

    #[test]
    fn model_call_display_includes_kind() {
        let err = PipelineError::model_call(ModelFailureKind::Authentication, "bad key");
        assert_eq!(err.to_string(), "model call failed (authentication): bad key");
    }

    #[test]
    fn unsupported_format_maps_to_media_type_error() {
        let api: ApiError = PipelineError::UnsupportedFormat(".exe".into()).into();
        assert!(matches!(api, ApiError::UnsupportedMediaType(_)));
    }
}
