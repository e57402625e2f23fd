use super::store::ConversationStore;
use super::types::{ImageRef, Session, SessionId, SessionSnapshot};
use crate::document::Passage;
use crate::services::error::AgentError;
use crate::services::providers::EmbeddingProvider;
use crate::services::retrieval::{DocumentIndex, IndexStore};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Per-session lock. Held for a whole chat exchange or index extension, so two
/// requests on the same session never interleave; other sessions are unaffected.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Which of the mutually exclusive ingestion paths an upload took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLifecycle {
    /// No index anywhere, built from the upload
    Fresh,
    /// Resident index extended in place
    Extended,
    /// Durable copy loaded (nothing resident), then extended
    Restored,
    /// Same fingerprint as the indexed document, nothing re-embedded
    Unchanged,
}

/// A parsed, chunked document ready for indexing.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub source: String,
    pub fingerprint: String,
    pub chunks: Vec<Passage>,
}

/// Process-wide session table.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    conversations: Arc<dyn ConversationStore>,
    indexes: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

/// Ids end up in file names, so only a conservative charset is accepted.
pub fn validate_session_id(session_id: &str) -> Result<(), AgentError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AgentError::UnsupportedInput(format!(
            "invalid session id '{}'",
            session_id
        )))
    }
}

impl SessionRegistry {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        indexes: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        info!("Initializing session registry with DashMap");
        Self {
            sessions: DashMap::new(),
            conversations,
            indexes,
            embedder,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn create_session(&self) -> SessionId {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            Arc::new(Mutex::new(Session::new(session_id.clone()))),
        );
        info!("🟢 Session {} created", session_id);
        session_id
    }

    /// Returns the resident session or creates it, restoring memory from the
    /// conversation store when a durable record exists.
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionHandle, AgentError> {
        validate_session_id(session_id)?;

        if let Some(entry) = self.sessions.get(session_id) {
            return Ok(entry.value().clone());
        }

        let mut session = Session::new(session_id);
        match self.conversations.load(session_id).await {
            Ok(Some(memory)) => {
                info!("📚 Session {} restored with {} turns", session_id, memory.len());
                session.memory = memory;
            }
            Ok(None) => debug!("Session {} starts empty", session_id),
            Err(e) => warn!("Could not restore memory for {}: {:#}", session_id, e),
        }

        // a concurrent caller may have inserted meanwhile; first insert wins
        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .value()
            .clone();
        Ok(handle)
    }

    /// Resident session only; never creates.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    /// Loads the durable index when nothing is resident. Returns true if one was loaded.
    pub async fn ensure_index_loaded(&self, session: &mut Session) -> Result<bool, AgentError> {
        if session.index.is_some() {
            return Ok(false);
        }
        match self.indexes.load(&session.id).await.map_err(AgentError::storage)? {
            Some(index) => {
                info!(
                    "📦 Restored index for session {} ({} passages)",
                    session.id,
                    index.len()
                );
                session.index = Some(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn attach_document(
        &self,
        session_id: &str,
        upload: DocumentUpload,
    ) -> Result<IndexLifecycle, AgentError> {
        if upload.chunks.is_empty() {
            return Err(AgentError::UnsupportedInput(format!(
                "no valid content in {}",
                upload.source
            )));
        }

        let handle = self.get_or_create(session_id).await?;

        if handle.lock().await.is_indexed(&upload.fingerprint) {
            info!("Document {} already indexed for {}, skipping", upload.source, session_id);
            return Ok(IndexLifecycle::Unchanged);
        }

        // embedding runs unlocked; only the index extension below excludes chats
        let texts: Vec<String> = upload.chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(AgentError::capability)?;

        let mut session = handle.lock().await;
        if session.is_indexed(&upload.fingerprint) {
            info!("Document {} indexed concurrently for {}, skipping", upload.source, session_id);
            return Ok(IndexLifecycle::Unchanged);
        }
        let chunk_count = upload.chunks.len();

        // durable storage is consulted only when nothing is resident
        let (mut index, lifecycle) = match session.index.take() {
            Some(resident) => (resident, IndexLifecycle::Extended),
            None => match self.indexes.load(session_id).await.map_err(AgentError::storage)? {
                Some(restored) => (restored, IndexLifecycle::Restored),
                None => (DocumentIndex::new(), IndexLifecycle::Fresh),
            },
        };

        let added = index.add(upload.chunks, vectors);
        if added.is_ok() || lifecycle == IndexLifecycle::Extended {
            session.index = Some(index);
        }
        added.map_err(|e| AgentError::Internal(format!("{:#}", e)))?;

        session.fingerprint = Some(upload.fingerprint);
        session.touch();

        if let Some(index) = session.index.as_ref() {
            info!(
                "📑 {:?} index for {}: +{} chunks from {} ({} total)",
                lifecycle,
                session_id,
                chunk_count,
                upload.source,
                index.len()
            );
            if let Err(e) = self.indexes.save(session_id, index).await {
                error!("Failed to persist index for {}: {:#}", session_id, e);
            }
        }

        Ok(lifecycle)
    }

    /// Returns the session's image count after the append.
    pub async fn attach_image(
        &self,
        session_id: &str,
        bytes: Bytes,
        file_name: Option<String>,
    ) -> Result<usize, AgentError> {
        if bytes.is_empty() {
            return Err(AgentError::UnsupportedInput("empty image".to_string()));
        }

        let handle = self.get_or_create(session_id).await?;
        let mut session = handle.lock().await;

        let image = ImageRef::new(bytes, file_name);
        info!(
            "🖼️ Image {} ({}, {} bytes) attached to {}",
            image.file_name.as_deref().unwrap_or("<unnamed>"),
            image.mime,
            image.bytes.len(),
            session_id
        );
        session.images.push(image);
        // the next document upload must not be skipped as "unchanged"
        session.fingerprint = None;
        session.touch();

        Ok(session.images.len())
    }

    /// Clears memory, index and images, and drops their durable copies.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), AgentError> {
        let handle = self.get_or_create(session_id).await?;
        let mut session = handle.lock().await;

        session.clear();
        self.conversations
            .remove(session_id)
            .await
            .map_err(AgentError::storage)?;
        self.indexes
            .remove(session_id)
            .await
            .map_err(AgentError::storage)?;

        info!("RESET: session {} cleared", session_id);
        Ok(())
    }

    pub async fn persist_memory(&self, session: &Session) -> Result<(), AgentError> {
        self.conversations
            .save(&session.id, &session.memory)
            .await
            .map_err(AgentError::storage)
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = self.get(session_id)?;
        let session = handle.lock().await;
        Some(session.snapshot())
    }

    /// Evicts sessions idle for longer than `max_idle`. Busy sessions (locked or
    /// referenced by an in-flight request) are kept. Durable state is untouched.
    pub fn cleanup_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(session) => session.last_activity.elapsed() < max_idle,
                Err(_) => true,
            }
        });

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("Evicted {} idle sessions", removed);
        }
        removed
    }
}
