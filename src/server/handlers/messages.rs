use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::envelope::TransportMessage;
use crate::state::AppState;

/// Deliver a raw transport message to the stage named in `receiver` and
/// return that stage's reply.
pub async fn dispatch_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let message: TransportMessage = serde_json::from_value(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid transport message: {}", err)))?;

    if !message.is_valid() {
        tracing::warn!(
            "Dispatching incomplete message {} -> {} [{}]",
            message.sender,
            message.receiver,
            message.kind
        );
    }

    let reply = state.pipeline.dispatch(&message).await;
    Ok(Json(reply.to_transport_form()))
}
