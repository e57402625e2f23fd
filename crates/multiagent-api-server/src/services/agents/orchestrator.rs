use super::classifier::{RequestState, RoutingDecision};
use super::dispatcher::Dispatcher;
use super::HandlerReply;
use crate::services::error::AgentError;
use crate::services::session::registry::validate_session_id;
use crate::services::session::{SessionId, SessionRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct AgentReply {
    pub session_id: SessionId,
    pub strategy: RoutingDecision,
    pub answer: String,
    pub sources: Vec<String>,
    pub fallback_used: bool,
    pub elapsed: Duration,
}

/// Single entry point for chat requests: lock the session, classify, dispatch,
/// commit. The whole pipeline runs as one task under a request timeout.
pub struct AgentOrchestrator {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    request_timeout: Duration,
}

impl AgentOrchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            request_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn classify_and_respond(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<AgentReply, AgentError> {
        let started = Instant::now();

        let message = message.trim();
        if message.is_empty() {
            return Err(AgentError::UnsupportedInput("empty message".to_string()));
        }
        validate_session_id(session_id)?;

        info!("Chat request for session {}", session_id);

        // set on timeout; the task checks it before committing
        let abandoned = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_pipeline(
            self.registry.clone(),
            self.dispatcher.clone(),
            session_id.to_string(),
            message.to_string(),
            abandoned.clone(),
        ));

        let reply = match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                error!("Chat pipeline task failed: {}", join_error);
                return Err(AgentError::Internal(format!("pipeline task failed: {}", join_error)));
            }
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                warn!(
                    "⏱️ Session {} timed out after {:?}, result will be discarded",
                    session_id, self.request_timeout
                );
                return Err(AgentError::Timeout(self.request_timeout.as_secs()));
            }
        };

        let elapsed = started.elapsed();
        info!(
            "✅ Session {} answered by {} (fallback: {}) in {:.3}s",
            session_id,
            reply.strategy,
            reply.fallback_used,
            elapsed.as_secs_f64()
        );

        Ok(AgentReply {
            session_id: session_id.to_string(),
            strategy: reply.strategy,
            answer: reply.answer,
            sources: reply.sources,
            fallback_used: reply.fallback_used,
            elapsed,
        })
    }
}

async fn run_pipeline(
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    session_id: String,
    message: String,
    abandoned: Arc<AtomicBool>,
) -> Result<HandlerReply, AgentError> {
    let handle = registry.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;

    if let Err(e) = registry.ensure_index_loaded(&mut session).await {
        warn!("Could not restore index for {}: {}", session_id, e);
    }

    let checkpoint = session.memory.len();
    let mut request = RequestState::new(message);
    let result = dispatcher.run(&mut request, &mut session).await;

    if abandoned.load(Ordering::SeqCst) {
        session.memory.truncate(checkpoint);
        info!("Discarding late result for session {}", session_id);
        return Err(AgentError::Timeout(0));
    }

    match result {
        Ok(reply) => {
            session.touch();
            if let Err(e) = registry.persist_memory(&session).await {
                error!("Failed to persist memory for {}: {}", session_id, e);
            }
            Ok(reply)
        }
        Err(e) => {
            session.memory.truncate(checkpoint);
            Err(e)
        }
    }
}
