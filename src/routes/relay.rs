// src/routes/relay.rs
use axum::{Json, extract::State};

use crate::{error::AppError, message::RelayRequest, state::SharedState};

/// Forward one prompt to the backend without streaming and hand its JSON back
/// as-is.
pub async fn relay_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RelayRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let RelayRequest {
        ip_address,
        model_name,
        prompt,
    } = payload;

    let value = state
        .transport
        .generate_once(&ip_address, &model_name, &prompt)
        .await
        .map_err(AppError::Relay)?;
    Ok(Json(value))
}
