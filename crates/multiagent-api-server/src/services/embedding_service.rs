use crate::config::EmbeddingConfig;
use crate::services::llm_service::build_client;
use crate::services::providers::EmbeddingProvider;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be greater than zero");
        }
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            config,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding {} text(s)", texts.len());

        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embeddings = parse_embeddings(&json_value)?;
        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding server returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            anyhow::bail!("Generated embedding is empty");
        }
        if self.config.dimension > 0 && embedding.len() != self.config.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.config.dimension,
                embedding.len()
            );
        }
        Ok(())
    }
}

fn floats(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

/// Accepts the response shapes seen in practice:
/// OpenAI `{"data": [{"index", "embedding"}]}`, llama.cpp `{"embedding": [...]}`
/// and bare arrays of objects or of vectors.
fn parse_embeddings(json_value: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(data) = json_value.get("data").and_then(Value::as_array) {
        let mut indexed: Vec<(u64, Vec<f32>)> = data
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                let index = item.get("index").and_then(Value::as_u64).unwrap_or(pos as u64);
                item.get("embedding")
                    .and_then(floats)
                    .map(|v| (index, v))
                    .ok_or_else(|| anyhow::anyhow!("Missing embedding in data item {}", pos))
            })
            .collect::<Result<_>>()?;
        indexed.sort_by_key(|(index, _)| *index);
        return Ok(indexed.into_iter().map(|(_, v)| v).collect());
    }

    if let Some(single) = json_value.get("embedding").and_then(floats) {
        return Ok(vec![single]);
    }

    if let Some(arr) = json_value.as_array() {
        if arr.iter().all(Value::is_number) && !arr.is_empty() {
            return Ok(floats(json_value).into_iter().collect());
        }
        return arr
            .iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(floats)
                    .or_else(|| floats(item))
                    .ok_or_else(|| anyhow::anyhow!("Unrecognized embedding item: {}", item))
            })
            .collect();
    }

    anyhow::bail!("Unrecognized embedding response format: {}", json_value)
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding server returned no vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size;
        let total_batches = texts.len().div_ceil(batch_size);
        if total_batches > 1 {
            info!(
                "Embedding {} texts in {} batches of up to {}",
                texts.len(),
                total_batches,
                batch_size
            );
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            let embedded = self
                .request(batch)
                .await
                .with_context(|| format!("Embedding batch {}/{} failed", batch_idx + 1, total_batches))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}
