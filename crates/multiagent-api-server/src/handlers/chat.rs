use crate::models::{ChatRequest, ChatResponse};
use crate::services::agents::AgentOrchestrator;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

pub async fn chat_handler(
    State(orchestrator): State<Arc<AgentOrchestrator>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("session_id obbligatorio".to_string()))?;

    info!(
        "👤 Chat request: session={}, message_len={}",
        session_id,
        request.message.len()
    );

    let reply = orchestrator
        .classify_and_respond(&session_id, &request.message)
        .await?;

    Ok(Json(reply.into()))
}
