pub mod classifier;
pub mod dispatcher;
pub mod document;
pub mod general;
pub mod orchestrator;
pub mod vision;

pub use classifier::{Classifier, RequestState, RoutingDecision};
pub use dispatcher::{DispatchState, Dispatcher};
pub use document::DocumentHandler;
pub use general::GeneralHandler;
pub use orchestrator::{AgentOrchestrator, AgentReply};
pub use vision::VisionHandler;

/// What a strategy handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerReply {
    pub strategy: RoutingDecision,
    pub answer: String,
    pub sources: Vec<String>,
    /// Document strategy answered by the plain LLM instead of retrieval
    pub fallback_used: bool,
}

impl HandlerReply {
    pub fn new(strategy: RoutingDecision, answer: impl Into<String>) -> Self {
        Self {
            strategy,
            answer: answer.into(),
            sources: Vec::new(),
            fallback_used: false,
        }
    }
}
