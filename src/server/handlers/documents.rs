use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub name: String,
}

/// Ingest one document sent as the raw request body; `name` carries the
/// file name whose extension selects the extractor.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let name = params.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name query parameter is required".to_string()));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is empty", name)));
    }

    let report = state.pipeline.ingest(name, &body).await?;
    Ok(Json(report))
}
