//! Google Gemini provider.
//!
//! Uses the `generateContent` REST call, and `streamGenerateContent` with
//! `alt=sse` for incremental delivery. The system prompt and the user's
//! request are sent as a single text part.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::http::{for_each_sse_data, post_json, send_checked};
use super::{LlmProvider, ProviderSettings, TEST_PROMPT};
use crate::error::{GenerationError, GenerationResult};
use crate::types::{ProviderConfig, StreamChunk};

pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    model: String,
    system_prompt: String,
    client: reqwest::Client,
}

/// Concatenated text parts of the first candidate.
fn candidate_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

impl GeminiProvider {
    pub fn new(
        config: &ProviderConfig,
        api_base: String,
        settings: &ProviderSettings,
        client: reqwest::Client,
    ) -> Self {
        let model = config.model();
        Self {
            api_key: config.api_key.clone(),
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model: model.strip_prefix("models/").unwrap_or(model).to_string(),
            system_prompt: settings.system_prompt.clone(),
            client,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, self.model, method)
    }

    fn post(&self, method: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Google Gemini"
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "parts": [{ "text": format!("{}\n\n{}", self.system_prompt, prompt) }]
            }]
        })
    }

    fn extract_text(&self, body: &Value) -> GenerationResult<String> {
        candidate_text(body)
            .ok_or_else(|| GenerationError::response_format("missing candidates[0].content.parts"))
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let body = self.build_request(prompt);
        tracing::debug!(provider = "Google Gemini", model = %self.model, "sending generation request");
        let response = post_json(self.post("generateContent", &body))
            .await
            .map_err(gemini_error)?;
        self.extract_text(&response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        chunk_tx: mpsc::UnboundedSender<StreamChunk>,
    ) -> GenerationResult<String> {
        let body = self.build_request(prompt);
        tracing::debug!(provider = "Google Gemini", model = %self.model, "sending streaming request");
        let request = self
            .post("streamGenerateContent", &body)
            .query(&[("alt", "sse")]);
        let response = send_checked(request).await.map_err(gemini_error)?;

        let mut buffer = String::new();
        for_each_sse_data(response, |data| {
            let chunk: Value = serde_json::from_str(data).map_err(|e| {
                GenerationError::response_format(format!("bad stream chunk: {}", e))
            })?;
            // Chunks without text (safety ratings, usage) are skipped.
            if let Some(text) = candidate_text(&chunk) {
                buffer.push_str(&text);
                let _ = chunk_tx.send(StreamChunk::TextDelta(text));
            }
            Ok(())
        })
        .await
        .map_err(gemini_error)?;

        let _ = chunk_tx.send(StreamChunk::Done);
        Ok(buffer)
    }

    async fn probe(&self) -> GenerationResult<()> {
        let body = json!({ "contents": [{ "parts": [{ "text": TEST_PROMPT }] }] });
        let response = post_json(self.post("generateContent", &body))
            .await
            .map_err(gemini_error)?;
        match response.pointer("/candidates/0/content") {
            Some(content) if !content.is_null() => Ok(()),
            _ => Err(GenerationError::response_format("missing candidates[0].content")),
        }
    }
}

fn gemini_error(err: GenerationError) -> GenerationError {
    match err {
        GenerationError::Network(msg) => GenerationError::Network(format!("Gemini API error: {}", msg)),
        other => other,
    }
}
