use crate::models::{InitSessionResponse, ResetRequest, ResetResponse};
use crate::services::session::{SessionRegistry, SessionSnapshot};
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

pub async fn init_session(State(registry): State<Arc<SessionRegistry>>) -> Json<InitSessionResponse> {
    Json(InitSessionResponse {
        session_id: registry.create_session(),
    })
}

pub async fn reset_session(
    State(registry): State<Arc<SessionRegistry>>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    registry.reset_session(&request.session_id).await?;

    Ok(Json(ResetResponse {
        status: "reset".to_string(),
        message: format!("Sessione {} cancellata", request.session_id),
    }))
}

/// Resident sessions only; an evicted or unknown id is a 404.
pub async fn session_snapshot(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    registry
        .snapshot(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))
}
