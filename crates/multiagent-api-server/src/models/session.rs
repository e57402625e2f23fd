use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct InitSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
}
