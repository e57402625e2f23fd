use super::types::ConversationMemory;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable conversation history, one record per session.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationMemory>>;
    async fn save(&self, session_id: &str, memory: &ConversationMemory) -> Result<()>;
    async fn remove(&self, session_id: &str) -> Result<()>;
}

/// `<dir>/<session_id>.json`, a pretty-printed array of `[role, content]` pairs.
pub struct JsonConversationStore {
    dir: PathBuf,
}

impl JsonConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait::async_trait]
impl ConversationStore for JsonConversationStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationMemory>> {
        let path = self.path(session_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };

        let pairs: Vec<(String, String)> = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid conversation file {:?}", path))?;
        debug!("📚 Loaded {} turns for session {}", pairs.len(), session_id);
        Ok(Some(ConversationMemory::from_pairs(pairs)))
    }

    async fn save(&self, session_id: &str, memory: &ConversationMemory) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create memory dir {:?}", self.dir))?;

        let path = self.path(session_id);
        let body = serde_json::to_vec_pretty(&memory.to_pairs())?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move conversation file into {:?}", path))?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        let path = self.path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("RESET: conversation file {:?} removed", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("RESET: no conversation file for {}", session_id);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    records: RwLock<HashMap<String, ConversationMemory>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationMemory>> {
        Ok(self.records.read().get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, memory: &ConversationMemory) -> Result<()> {
        self.records
            .write()
            .insert(session_id.to_string(), memory.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.records.write().remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_file_format() {
        let dir = std::env::temp_dir().join(format!("memory-store-{}", uuid::Uuid::new_v4()));
        let store = JsonConversationStore::new(&dir);

        let mut memory = ConversationMemory::new();
        memory.add_user_message("cosa contiene il documento?");
        memory.add_ai_message("Un manuale di manutenzione.");
        store.save("abc", &memory).await.unwrap();

        let raw = std::fs::read_to_string(dir.join("abc.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0][0], "human");
        assert_eq!(value[1][0], "ai");
        assert_eq!(value[1][1], "Un manuale di manutenzione.");

        assert_eq!(store.load("abc").await.unwrap(), Some(memory));
        assert_eq!(store.load("missing").await.unwrap(), None);

        store.remove("abc").await.unwrap();
        assert!(!dir.join("abc.json").exists());
        store.remove("abc").await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_json_file_corrupt_is_error() {
        let dir = std::env::temp_dir().join(format!("memory-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), b"{not json").unwrap();

        let store = JsonConversationStore::new(&dir);
        assert!(store.load("bad").await.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
