// ===== Capability seams =====
// Handlers, the classifier fallback and the retrieval pipeline only see these
// traits; the reqwest-backed services implement them.

use anyhow::Result;
use bytes::Bytes;

/// One image attached to a multimodal request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub bytes: Bytes,
    pub mime: String,
}

/// Plain text generation: one prompt in, one completion out.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Multimodal generation over text plus raw image bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    async fn generate_with_images(&self, prompt: &str, images: &[ImageInput]) -> Result<String>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output order matches `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
