use crate::services::providers::ImageInput;
use crate::services::retrieval::DocumentIndex;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role tag used in the persisted conversation file.
    pub fn persisted_tag(&self) -> &'static str {
        match self {
            Role::User => "human",
            Role::Assistant => "ai",
        }
    }

    /// Anything that is not `human` is read back as an assistant turn.
    pub fn from_persisted_tag(tag: &str) -> Self {
        if tag == "human" {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns of one session. Append-only except for rollback of an
/// uncommitted exchange via [`ConversationMemory::truncate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn add_ai_message(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn after the first `len`. Used to discard a failed exchange.
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// `[[role, content], ...]` with role in {human, ai}
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.turns
            .iter()
            .map(|t| (t.role.persisted_tag().to_string(), t.content.clone()))
            .collect()
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            turns: pairs
                .into_iter()
                .map(|(role, content)| Turn {
                    role: Role::from_persisted_tag(&role),
                    content,
                })
                .collect(),
        }
    }
}

/// An uploaded image kept in RAM for the vision handler.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub bytes: Bytes,
    pub mime: String,
    pub file_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl ImageRef {
    /// MIME is sniffed from magic bytes, then guessed from the file name, then
    /// defaults to JPEG.
    pub fn new(bytes: Bytes, file_name: Option<String>) -> Self {
        let mime = infer::get(&bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| {
                file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .filter(|m| m.type_() == mime_guess::mime::IMAGE)
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| "image/jpeg".to_string());

        Self {
            bytes,
            mime,
            file_name,
            uploaded_at: Utc::now(),
        }
    }

    pub fn to_input(&self) -> ImageInput {
        ImageInput {
            bytes: self.bytes.clone(),
            mime: self.mime.clone(),
        }
    }
}

/// Everything the registry tracks for one conversation.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub memory: ConversationMemory,
    pub index: Option<DocumentIndex>,
    pub images: Vec<ImageRef>,
    /// SHA-256 of the last indexed upload
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            memory: ConversationMemory::new(),
            index: None,
            images: Vec::new(),
            fingerprint: None,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn has_document(&self) -> bool {
        self.index.is_some()
    }

    pub fn has_image(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn latest_image(&self) -> Option<&ImageRef> {
        self.images.last()
    }

    /// True when the resident index was built from a document with this fingerprint.
    pub fn is_indexed(&self, fingerprint: &str) -> bool {
        self.index.is_some() && self.fingerprint.as_deref() == Some(fingerprint)
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Clears memory, index, images and fingerprint. The id stays valid.
    pub fn clear(&mut self) {
        self.memory.clear();
        self.index = None;
        self.images.clear();
        self.fingerprint = None;
        self.touch();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            turns: self.memory.len(),
            images: self.images.len(),
            has_document: self.has_document(),
            passages: self.index.as_ref().map_or(0, |i| i.len()),
            fingerprint: self.fingerprint.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub turns: usize,
    pub images: usize,
    pub has_document: bool,
    pub passages: usize,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}
