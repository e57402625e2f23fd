use super::index::{DocumentIndex, PersistedDocstore, PersistedVectors};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const VECTORS_FILE: &str = "vectors.json";
const DOCSTORE_FILE: &str = "docstore.json";

/// Durable copy of a session's document index.
#[async_trait::async_trait]
pub trait IndexStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentIndex>>;
    async fn save(&self, session_id: &str, index: &DocumentIndex) -> Result<()>;
    async fn remove(&self, session_id: &str) -> Result<()>;
}

/// One directory per session: `<root>/index_<session_id>/{vectors,docstore}.json`.
pub struct FsIndexStore {
    root: PathBuf,
}

impl FsIndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("index_{}", session_id))
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        // write-then-rename, readers never see a half-written file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move index file into {:?}", path))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl IndexStore for FsIndexStore {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentIndex>> {
        let dir = self.session_dir(session_id);
        let vectors_path = dir.join(VECTORS_FILE);
        let docstore_path = dir.join(DOCSTORE_FILE);

        if !tokio::fs::try_exists(&vectors_path).await.unwrap_or(false)
            || !tokio::fs::try_exists(&docstore_path).await.unwrap_or(false)
        {
            debug!("No durable index for session {}", session_id);
            return Ok(None);
        }

        let vectors: PersistedVectors = serde_json::from_slice(
            &tokio::fs::read(&vectors_path)
                .await
                .with_context(|| format!("Failed to read {:?}", vectors_path))?,
        )
        .context("Invalid vectors.json")?;
        let docstore: PersistedDocstore = serde_json::from_slice(
            &tokio::fs::read(&docstore_path)
                .await
                .with_context(|| format!("Failed to read {:?}", docstore_path))?,
        )
        .context("Invalid docstore.json")?;

        let index = DocumentIndex::from_persisted(vectors, docstore)?;
        info!(
            "📦 Index for session {} loaded from {:?} ({} passages)",
            session_id,
            dir,
            index.len()
        );
        Ok(Some(index))
    }

    async fn save(&self, session_id: &str, index: &DocumentIndex) -> Result<()> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create index dir {:?}", dir))?;

        let (vectors, docstore) = index.to_persisted();
        Self::write_json(&dir.join(DOCSTORE_FILE), &docstore).await?;
        Self::write_json(&dir.join(VECTORS_FILE), &vectors).await?;

        debug!("Index for session {} saved ({} passages)", session_id, index.len());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Removed durable index {:?}", dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", dir)),
        }
    }
}

/// RAM-only store, used when persistence is disabled and in tests.
#[derive(Default)]
pub struct InMemoryIndexStore {
    indexes: DashMap<String, DocumentIndex>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.indexes.contains_key(session_id)
    }
}

#[async_trait::async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentIndex>> {
        Ok(self.indexes.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, session_id: &str, index: &DocumentIndex) -> Result<()> {
        self.indexes.insert(session_id.to_string(), index.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.indexes.remove(session_id);
        Ok(())
    }
}
