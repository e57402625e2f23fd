use crate::config::LlmConfig;
use crate::services::providers::LlmProvider;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<M: Serialize> {
    pub model: String,
    pub messages: Vec<M>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    pub(crate) fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("No choices returned from model"))
    }
}

pub(crate) fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// POST to an OpenAI-compatible `/v1/chat/completions` and return the first choice.
pub(crate) async fn send_completion(request: RequestBuilder, api_key: Option<&str>) -> Result<String> {
    let request = match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    };

    let response = request.send().await.context("Failed to call model API")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Model API error: {} - {}", status, body);
    }

    let completion: ChatCompletionResponse = response
        .json()
        .await
        .context("Failed to parse model response")?;
    completion.into_text()
}

/// Text LLM used by the general handler, the router fallback and the retrieval pipeline.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("LLM generate: {} chars, model={}", prompt.len(), self.config.model);

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![TextMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        send_completion(
            self.client.post(self.endpoint()).json(&request),
            self.config.api_key.as_deref(),
        )
        .await
    }
}
