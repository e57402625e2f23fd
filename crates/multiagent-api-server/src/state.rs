use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Settings;
use crate::document::TextChunker;
use crate::services::agents::{
    AgentOrchestrator, Classifier, Dispatcher, DocumentHandler, GeneralHandler, VisionHandler,
};
use crate::services::retrieval::{
    FsIndexStore, InMemoryIndexStore, IndexStore, RetrievalConfig, RetrievalPipeline,
};
use crate::services::session::{
    ConversationStore, InMemoryConversationStore, JsonConversationStore, SessionRegistry,
};
use crate::services::{
    EmbeddingProvider, EmbeddingService, LlmProvider, LlmService, VisionProvider, VisionService,
};

/// The three model backends the agents talk to.
#[derive(Clone)]
pub struct Capabilities {
    pub llm: Arc<dyn LlmProvider>,
    pub vision: Arc<dyn VisionProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl Capabilities {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            llm: Arc::new(LlmService::new(settings.llm.clone())?),
            vision: Arc::new(VisionService::new(settings.vision.clone())?),
            embedder: Arc::new(EmbeddingService::new(settings.embedding.clone())?),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub chunker: Arc<TextChunker>,
}

impl AppState {
    /// HTTP-backed capabilities, file or in-memory stores depending on `storage.persist`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let capabilities = Capabilities::from_settings(&settings)?;

        let (conversations, indexes): (Arc<dyn ConversationStore>, Arc<dyn IndexStore>) =
            if settings.storage.persist {
                info!(
                    "💾 Persisting memory to {:?} and indexes to {:?}",
                    settings.memory_dir(),
                    settings.index_dir()
                );
                (
                    Arc::new(JsonConversationStore::new(settings.memory_dir())),
                    Arc::new(FsIndexStore::new(settings.index_dir())),
                )
            } else {
                info!("Persistence disabled, sessions live in RAM only");
                (
                    Arc::new(InMemoryConversationStore::new()),
                    Arc::new(InMemoryIndexStore::new()),
                )
            };

        Self::build(settings, capabilities, conversations, indexes)
    }

    pub fn build(
        settings: Settings,
        capabilities: Capabilities,
        conversations: Arc<dyn ConversationStore>,
        indexes: Arc<dyn IndexStore>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap)?;

        let registry = Arc::new(SessionRegistry::new(
            conversations,
            indexes,
            capabilities.embedder.clone(),
        ));

        let pipeline = Arc::new(RetrievalPipeline::new(
            capabilities.llm.clone(),
            capabilities.embedder.clone(),
            RetrievalConfig::from_settings(&settings.rag, &settings.prompts),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            Classifier::new(
                Some(capabilities.llm.clone()),
                settings.prompts.router_prompt_template.clone(),
            ),
            DocumentHandler::new(pipeline, capabilities.llm.clone()),
            GeneralHandler::new(capabilities.llm.clone()),
            VisionHandler::new(capabilities.vision.clone()),
        ));

        let orchestrator = Arc::new(AgentOrchestrator::new(
            registry.clone(),
            dispatcher,
            Duration::from_secs(settings.server.request_timeout_seconds),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            registry,
            orchestrator,
            chunker: Arc::new(chunker),
        })
    }
}

impl FromRef<AppState> for Arc<SessionRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for Arc<AgentOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}
