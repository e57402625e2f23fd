use crate::config::LlmConfig;
use crate::services::llm_service::{build_client, send_completion, ChatCompletionRequest};
use crate::services::providers::{ImageInput, VisionProvider};
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// Vision-language model behind an OpenAI-compatible endpoint.
/// Images travel inline as base64 data URLs.
#[derive(Clone)]
pub struct VisionService {
    client: Client,
    config: LlmConfig,
}

impl VisionService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            config,
        })
    }

    fn user_message(prompt: &str, images: &[ImageInput]) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        content.extend(images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.mime, STANDARD.encode(&image.bytes))
                }
            })
        }));

        json!({ "role": "user", "content": content })
    }
}

#[async_trait::async_trait]
impl VisionProvider for VisionService {
    async fn generate_with_images(&self, prompt: &str, images: &[ImageInput]) -> Result<String> {
        debug!(
            "VLM generate: {} chars, {} image(s), model={}",
            prompt.len(),
            images.len(),
            self.config.model
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Self::user_message(prompt, images)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        send_completion(
            self.client.post(url).json(&request),
            self.config.api_key.as_deref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_user_message_layout() {
        let images = vec![ImageInput {
            bytes: Bytes::from_static(&[0x89, b'P', b'N', b'G']),
            mime: "image/png".to_string(),
        }];
        let message = VisionService::user_message("cosa vedi?", &images);

        assert_eq!(message["role"], "user");
        assert_eq!(message["content"][0]["text"], "cosa vedi?");
        assert_eq!(
            message["content"][1]["image_url"]["url"],
            "data:image/png;base64,iVBORw=="
        );
        assert_eq!(message["content"].as_array().map(|a| a.len()), Some(2));
    }
}
