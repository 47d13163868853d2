//! Anthropic (Claude) LLM provider implementation.
//!
//! Key differences from the OpenAI format:
//! - **Endpoint**: POST `{base}/v1/messages`
//! - **Auth**: `x-api-key` header plus a pinned `anthropic-version`
//! - **Prompt**: the system prompt is folded into the single user message
//! - **Response**: `content` is an array of blocks; the first one carries
//!   the text

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::post_json;
use super::{user_instruction, LlmProvider, ProviderSettings, TEST_MAX_TOKENS, TEST_PROMPT};
use crate::error::{GenerationError, GenerationResult};
use crate::types::ProviderConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicProvider {
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        config: &ProviderConfig,
        api_base: String,
        settings: &ProviderSettings,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt.clone(),
            client,
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "messages": [{
                "role": "user",
                "content": format!("{}\n{}", self.system_prompt, user_instruction(prompt)),
            }],
            "model": self.model,
            "max_tokens": self.max_tokens,
        })
    }

    fn extract_text(&self, body: &Value) -> GenerationResult<String> {
        body.pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| GenerationError::response_format("missing content[0].text"))
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let body = self.build_request(prompt);
        tracing::debug!(provider = "Anthropic", url = %self.url(), "sending generation request");
        let response = post_json(self.post(&body)).await?;
        self.extract_text(&response)
    }

    async fn probe(&self) -> GenerationResult<()> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": TEST_PROMPT }],
            "max_tokens": TEST_MAX_TOKENS,
        });
        let response = post_json(self.post(&body)).await?;
        match response.pointer("/content/0/text").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Ok(()),
            _ => Err(GenerationError::response_format("missing content[0].text")),
        }
    }
}
