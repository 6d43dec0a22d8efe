use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::security::require_api_key;
use crate::state::AppState;

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.read().await;
    let stats = store.stats();
    Ok(Json(json!({
        "total_documents": stats.total_documents,
        "index_size": stats.index_size,
        "embedding_dimension": stats.embedding_dimension,
        "embedding_model": stats.embedding_model,
        "location": stats.location,
        "load_diagnostic": store.load_diagnostic(),
    })))
}

pub async fn clear_store(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    state.pipeline.clear().await?;
    tracing::info!("Vector store cleared via API");
    Ok(Json(json!({"status": "cleared"})))
}
