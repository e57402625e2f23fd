use crate::services::agents::{AgentReply, RoutingDecision};
use serde::{Deserialize, Serialize};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub agent: RoutingDecision,
    pub answer: String,
    pub sources: Vec<String>,
    pub fallback_used: bool,
    /// seconds, millisecond precision
    pub elapsed_time: f64,
}

impl From<AgentReply> for ChatResponse {
    fn from(reply: AgentReply) -> Self {
        Self {
            session_id: reply.session_id,
            agent: reply.strategy,
            answer: reply.answer,
            sources: reply.sources,
            fallback_used: reply.fallback_used,
            elapsed_time: (reply.elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
        }
    }
}
