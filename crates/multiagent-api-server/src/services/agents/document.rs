use super::{HandlerReply, RoutingDecision};
use crate::services::error::AgentError;
use crate::services::providers::LlmProvider;
use crate::services::retrieval::{is_unknown_answer, RetrievalOutcome, RetrievalPipeline};
use crate::services::session::{Session, Turn};
use std::sync::Arc;
use tracing::{info, warn};

/// Retrieval over the session's documents, with a context-free LLM call as
/// fallback when retrieval fails or finds nothing grounded.
pub struct DocumentHandler {
    pipeline: Arc<RetrievalPipeline>,
    llm: Arc<dyn LlmProvider>,
}

impl DocumentHandler {
    pub fn new(pipeline: Arc<RetrievalPipeline>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { pipeline, llm }
    }

    pub async fn handle(&self, message: &str, session: &mut Session) -> Result<HandlerReply, AgentError> {
        info!("🛠️ Document agent for session {}", session.id);

        // prior turns only; the current question is passed separately
        let history: Vec<Turn> = session.memory.turns().to_vec();
        session.memory.add_user_message(message);

        let outcome = match session.index.as_ref() {
            Some(index) => self.pipeline.answer(index, message, &history).await,
            None => {
                warn!("Document strategy without an index for session {}", session.id);
                RetrievalOutcome::Insufficient
            }
        };

        let reply = match outcome {
            RetrievalOutcome::Answered(answer)
                if !is_unknown_answer(&answer.text, self.pipeline.unknown_sentinel()) =>
            {
                HandlerReply {
                    strategy: RoutingDecision::Document,
                    answer: answer.text,
                    sources: answer.sources,
                    fallback_used: false,
                }
            }
            other => {
                match &other {
                    RetrievalOutcome::Failed(reason) => {
                        warn!("⚠️ Retrieval failed ({}), using LLM fallback", reason)
                    }
                    _ => info!("⚠️ No grounded answer in documents, using LLM fallback"),
                }
                let answer = self
                    .llm
                    .generate(message)
                    .await
                    .map_err(AgentError::capability)?;
                HandlerReply {
                    strategy: RoutingDecision::Document,
                    answer,
                    sources: Vec::new(),
                    fallback_used: true,
                }
            }
        };

        session.memory.add_ai_message(reply.answer.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Passage;
    use crate::services::providers::{MockEmbeddingProvider, MockLlmProvider};
    use crate::services::retrieval::{DocumentIndex, RetrievalConfig};

    fn session_with_manual() -> Session {
        let mut index = DocumentIndex::new();
        index
            .add(
                vec![Passage {
                    content: "Il manuale descrive la manutenzione della pompa.".to_string(),
                    source: "manuale.pdf".to_string(),
                }],
                vec![vec![1.0, 0.0]],
            )
            .unwrap();
        let mut session = Session::new("s");
        session.index = Some(index);
        session
    }

    fn embedder(result: fn() -> anyhow::Result<Vec<f32>>) -> Arc<MockEmbeddingProvider> {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(move |_| result());
        Arc::new(embedder)
    }

    /// The pipeline and the fallback share one LLM, as in production.
    fn handler(llm: MockLlmProvider, embedder: Arc<MockEmbeddingProvider>) -> DocumentHandler {
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        let pipeline = RetrievalPipeline::new(llm.clone(), embedder, RetrievalConfig::default());
        DocumentHandler::new(Arc::new(pipeline), llm)
    }

    #[tokio::test]
    async fn test_grounded_answer_keeps_sources() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|p| p.contains("[Fonte: manuale.pdf]"))
            .times(1)
            .returning(|_| Ok("Contiene la manutenzione della pompa (manuale.pdf).".to_string()));

        let mut session = session_with_manual();
        let reply = handler(llm, embedder(|| Ok(vec![1.0, 0.0])))
            .handle("cosa contiene il documento?", &mut session)
            .await
            .unwrap();

        assert_eq!(reply.strategy, RoutingDecision::Document);
        assert!(!reply.fallback_used);
        assert_eq!(reply.sources, vec!["manuale.pdf".to_string()]);
        assert!(reply.answer.contains("manuale.pdf"));
    }

    #[tokio::test]
    async fn test_unknown_sentinel_is_replaced_by_fallback() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|p| p.contains("Contesto:"))
            .times(1)
            .returning(|_| Ok("Non lo so".to_string()));
        llm.expect_generate()
            .withf(|p| p == "chi ha scritto la divina commedia?")
            .times(1)
            .returning(|_| Ok("Dante Alighieri.".to_string()));

        let mut session = session_with_manual();
        let reply = handler(llm, embedder(|| Ok(vec![1.0, 0.0])))
            .handle("chi ha scritto la divina commedia?", &mut session)
            .await
            .unwrap();

        assert!(reply.fallback_used);
        assert_eq!(reply.answer, "Dante Alighieri.");
        assert!(!reply.answer.to_lowercase().contains("non lo so"));
        assert_eq!(session.memory.turns().last(), Some(&Turn::assistant("Dante Alighieri.")));
    }

    #[tokio::test]
    async fn test_retrieval_failure_leaves_one_exchange() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("Risposta generica.".to_string()));

        let mut session = session_with_manual();
        let reply = handler(llm, embedder(|| Err(anyhow::anyhow!("embedding server down"))))
            .handle("riassumi il pdf", &mut session)
            .await
            .unwrap();

        assert!(reply.fallback_used);
        assert_eq!(
            session.memory.turns(),
            &[Turn::user("riassumi il pdf"), Turn::assistant("Risposta generica.")]
        );
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("model offline")));

        let mut session = Session::new("s");
        let result = handler(llm, Arc::new(MockEmbeddingProvider::new()))
            .handle("riassumi il pdf", &mut session)
            .await;

        assert!(matches!(result, Err(AgentError::ExternalCapability(ref m)) if m.contains("model offline")));
    }

    #[tokio::test]
    async fn test_history_excludes_current_question() {
        let mut llm = MockLlmProvider::new();
        // condensation sees the earlier exchange but not the new question as history
        llm.expect_generate()
            .withf(|p| p.contains("Cronologia:") && p.contains("Utente: parliamo della pompa") && !p.contains("Utente: e la manutenzione?"))
            .times(1)
            .returning(|_| Ok("manutenzione della pompa".to_string()));
        llm.expect_generate()
            .withf(|p| p.contains("Contesto:"))
            .times(1)
            .returning(|_| Ok("Va lubrificata ogni mese, vedi manuale.pdf".to_string()));

        let mut session = session_with_manual();
        session.memory.add_user_message("parliamo della pompa");
        session.memory.add_ai_message("Va bene.");

        let reply = handler(llm, embedder(|| Ok(vec![1.0, 0.0])))
            .handle("e la manutenzione?", &mut session)
            .await
            .unwrap();

        assert!(!reply.fallback_used);
        assert_eq!(session.memory.len(), 4);
    }
}
