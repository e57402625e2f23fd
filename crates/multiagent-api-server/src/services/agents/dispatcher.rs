//! Request state machine.
//!
//! Start -> Classified -> Document | General | Vision -> Done
//!
//! The transition function is total: every state has exactly one successor for
//! a given decision, handler states always lead to Done and Done is absorbing,
//! so a run terminates after three transitions.

use super::classifier::{Classifier, RequestState, RoutingDecision};
use super::{DocumentHandler, GeneralHandler, HandlerReply, VisionHandler};
use crate::services::error::AgentError;
use crate::services::session::Session;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Start,
    Classified,
    Document,
    General,
    Vision,
    Done,
}

/// Missing decision routes to General.
pub fn switch(decision: Option<RoutingDecision>) -> DispatchState {
    match decision {
        Some(RoutingDecision::Document) => DispatchState::Document,
        Some(RoutingDecision::Vision) => DispatchState::Vision,
        Some(RoutingDecision::General) | None => DispatchState::General,
    }
}

pub fn next_state(state: DispatchState, decision: Option<RoutingDecision>) -> DispatchState {
    match state {
        DispatchState::Start => DispatchState::Classified,
        DispatchState::Classified => switch(decision),
        DispatchState::Document | DispatchState::General | DispatchState::Vision => DispatchState::Done,
        DispatchState::Done => DispatchState::Done,
    }
}

/// Valid transitions:
/// - Start -> Classified
/// - Classified -> Document | General | Vision
/// - Document | General | Vision -> Done
pub fn is_valid_transition(from: DispatchState, to: DispatchState) -> bool {
    matches!(
        (from, to),
        (DispatchState::Start, DispatchState::Classified)
            | (DispatchState::Classified, DispatchState::Document)
            | (DispatchState::Classified, DispatchState::General)
            | (DispatchState::Classified, DispatchState::Vision)
            | (DispatchState::Document, DispatchState::Done)
            | (DispatchState::General, DispatchState::Done)
            | (DispatchState::Vision, DispatchState::Done)
    )
}

pub struct Dispatcher {
    classifier: Classifier,
    document: DocumentHandler,
    general: GeneralHandler,
    vision: VisionHandler,
}

impl Dispatcher {
    pub fn new(
        classifier: Classifier,
        document: DocumentHandler,
        general: GeneralHandler,
        vision: VisionHandler,
    ) -> Self {
        Self {
            classifier,
            document,
            general,
            vision,
        }
    }

    /// Drives one request from Start to Done. Exactly one handler runs.
    pub async fn run(
        &self,
        request: &mut RequestState,
        session: &mut Session,
    ) -> Result<HandlerReply, AgentError> {
        let mut state = DispatchState::Start;
        let mut reply = None;

        while state != DispatchState::Done {
            match state {
                DispatchState::Start => {
                    self.classifier
                        .classify(request, session.has_document(), session.has_image())
                        .await;
                }
                DispatchState::Document => {
                    reply = Some(self.document.handle(&request.message, session).await?);
                }
                DispatchState::General => {
                    reply = Some(self.general.handle(&request.message, session).await?);
                }
                DispatchState::Vision => {
                    reply = Some(self.vision.handle(&request.message, session).await?);
                }
                DispatchState::Classified | DispatchState::Done => {}
            }

            let next = next_state(state, request.decision);
            debug!("Dispatch {:?} -> {:?}", state, next);
            debug_assert!(is_valid_transition(state, next));
            state = next;
        }

        reply.ok_or_else(|| AgentError::Internal("dispatch ended without a handler reply".to_string()))
    }
}
