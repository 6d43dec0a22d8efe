use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Answer a question; both stage envelopes are returned in transport form.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.pipeline.ask(&request.query).await;

    Ok(Json(json!({
        "answer": outcome.answer(),
        "is_error": outcome.response.is_error(),
        "trace_id": outcome.response.trace_id(),
        "retrieval": outcome.retrieval.to_transport_form(),
        "response": outcome.response.to_transport_form(),
    })))
}
