use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(json!({
        "status": "ok",
        "initialized": true,
        "documents": store.len(),
        "degraded": store.load_diagnostic().is_some()
    }))
}
