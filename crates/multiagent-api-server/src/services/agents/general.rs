use super::{HandlerReply, RoutingDecision};
use crate::services::error::AgentError;
use crate::services::providers::LlmProvider;
use crate::services::session::Session;
use std::sync::Arc;
use tracing::info;

/// Plain LLM answer, no retrieval and no extra context. Failures propagate.
pub struct GeneralHandler {
    llm: Arc<dyn LlmProvider>,
}

impl GeneralHandler {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn handle(&self, message: &str, session: &mut Session) -> Result<HandlerReply, AgentError> {
        info!("💬 General agent for session {}", session.id);
        session.memory.add_user_message(message);

        let answer = self
            .llm
            .generate(message)
            .await
            .map_err(AgentError::capability)?;

        session.memory.add_ai_message(answer.clone());
        Ok(HandlerReply::new(RoutingDecision::General, answer))
    }
}
