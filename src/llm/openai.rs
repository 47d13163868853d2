//! OpenAI chat completions provider.
//!
//! Serves both the official API and any OpenAI-compatible server (local
//! model runners, gateways); the two differ only in base URL and in the
//! name used for logs and preface cleanup.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::http::{for_each_sse_data, post_json, send_checked};
use super::{user_instruction, LlmProvider, ProviderSettings, TEST_MAX_TOKENS, TEST_PROMPT};
use crate::error::{GenerationError, GenerationResult};
use crate::types::{Provider, ProviderConfig, StreamChunk};

pub struct OpenAiProvider {
    kind: Provider,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    client: reqwest::Client,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    /// Absent on the closing chunk some servers send with only `finish_reason`.
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDelta {
    content: Option<String>,
}

// --- Implementation ---

impl OpenAiProvider {
    pub fn new(
        kind: Provider,
        config: &ProviderConfig,
        api_base: String,
        settings: &ProviderSettings,
        client: reqwest::Client,
    ) -> Self {
        Self {
            kind,
            api_key: config.api_key.clone(),
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt.clone(),
            client,
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": user_instruction(prompt) },
            ],
            "model": self.model,
            "max_tokens": self.max_tokens,
        })
    }

    fn extract_text(&self, body: &Value) -> GenerationResult<String> {
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                GenerationError::response_format("missing choices[0].message.content")
            })
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let body = self.build_request(prompt);
        tracing::debug!(provider = self.name(), url = %self.url(), "sending generation request");
        let response = post_json(self.post(&body)).await?;
        self.extract_text(&response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        chunk_tx: mpsc::UnboundedSender<StreamChunk>,
    ) -> GenerationResult<String> {
        let mut body = self.build_request(prompt);
        body["stream"] = json!(true);
        tracing::debug!(provider = self.name(), url = %self.url(), "sending streaming request");

        let response = send_checked(self.post(&body)).await?;
        let mut content = String::new();
        for_each_sse_data(response, |data| {
            let chunk: StreamResponseChunk = serde_json::from_str(data).map_err(|e| {
                GenerationError::response_format(format!("bad stream chunk: {}", e))
            })?;
            if let Some(text) = chunk.choices.first().and_then(|c| c.delta.content.as_ref()) {
                if !text.is_empty() {
                    content.push_str(text);
                    let _ = chunk_tx.send(StreamChunk::TextDelta(text.clone()));
                }
            }
            Ok(())
        })
        .await?;

        let _ = chunk_tx.send(StreamChunk::Done);
        Ok(content.trim().to_string())
    }

    async fn probe(&self) -> GenerationResult<()> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": TEST_PROMPT }],
            "max_tokens": TEST_MAX_TOKENS,
        });
        let response = post_json(self.post(&body)).await?;
        match response.pointer("/choices/0/message") {
            Some(message) if message.is_object() => Ok(()),
            _ => Err(GenerationError::response_format("missing choices[0].message")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> OpenAiProvider {
        let settings = settings_for(uri);
        let config = ProviderConfig::new(Provider::OpenAi, OPENAI_KEY).with_model("gpt-4o");
        OpenAiProvider::new(
            Provider::OpenAi,
            &config,
            settings.endpoints.openai.clone(),
            &settings,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_request_shape() {
        let p = provider("http://localhost");
        let body = p.build_request("sort a list");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "SYSTEM");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(
            body["messages"][1]["content"],
            "Generate Python code for: sort a list"
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2000);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_extract_text() {
        let p = provider("http://localhost");
        let body = json!({"choices": [{"message": {"content": "  print(1)\n"}}]});
        assert_eq!(p.extract_text(&body).unwrap(), "print(1)");

        let err = p.extract_text(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, GenerationError::ResponseFormat(_)));
        let err = p
            .extract_text(&json!({"choices": [{"message": {"content": null}}]}))
            .unwrap_err();
        assert!(matches!(err, GenerationError::ResponseFormat(_)));
    }

    #[test]
    fn test_compatible_base_url_trimmed() {
        let settings = settings_for("http://unused");
        let config = ProviderConfig::new(Provider::OpenAiCompatible, "local-key")
            .with_base_url("http://localhost:11434/v1/");
        let p = OpenAiProvider::new(
            Provider::OpenAiCompatible,
            &config,
            "http://localhost:11434/v1/".to_string(),
            &settings,
            reqwest::Client::new(),
        );
        assert_eq!(p.url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(p.name(), "OpenAI Compatible");
    }

    #[test]
    fn test_generate_sends_auth_and_body() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(header("authorization", format!("Bearer {}", OPENAI_KEY).as_str()))
                .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 2000})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "x = 1"}}]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let text = provider(&server.uri()).generate("set x").await.unwrap();
            assert_eq!(text, "x = 1");
        });
    }

    #[test]
    fn test_generate_surfaces_error_message() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "error": {"message": "Incorrect API key provided"}
                })))
                .mount(&server)
                .await;

            let err = provider(&server.uri()).generate("x").await.unwrap_err();
            assert!(matches!(err, GenerationError::Network(_)));
            assert_eq!(err.to_string(), "Incorrect API key provided");
        });
    }

    #[test]
    fn test_generate_generic_http_error() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
                .mount(&server)
                .await;

            let err = provider(&server.uri()).generate("x").await.unwrap_err();
            assert_eq!(err.to_string(), "HTTP error, status 503");
        });
    }

    #[test]
    fn test_stream_in_order() {
        rt().block_on(async {
            let server = MockServer::start().await;
            let body = [
                r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
                r#"{"choices":[{"delta":{"content":"print("}}]}"#,
                r#"{"choices":[{"delta":{"content":"'hi'"}}]}"#,
                r#"{"choices":[{"delta":{"content":")"}}]}"#,
                "[DONE]",
            ]
            .iter()
            .map(|event| format!("data: {}\n\n", event))
            .collect::<String>();
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(body_partial_json(json!({"stream": true})))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/event-stream")
                        .set_body_string(body),
                )
                .mount(&server)
                .await;

            let (tx, rx) = mpsc::unbounded_channel();
            let text = provider(&server.uri())
                .generate_stream("greet", tx)
                .await
                .unwrap();
            assert_eq!(text, "print('hi')");
            assert_eq!(collect_deltas(rx), vec!["print(", "'hi'", ")"]);
        });
    }

    #[test]
    fn test_stream_tolerates_finish_chunk_without_delta() {
        rt().block_on(async {
            let server = MockServer::start().await;
            let body = [
                r#"{"choices":[{"delta":{"content":"x = 1"}}]}"#,
                r#"{"choices":[{"index":0,"finish_reason":"stop"}]}"#,
                "[DONE]",
            ]
            .iter()
            .map(|event| format!("data: {}\n\n", event))
            .collect::<String>();
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;

            let (tx, rx) = mpsc::unbounded_channel();
            let text = provider(&server.uri())
                .generate_stream("assign", tx)
                .await
                .unwrap();
            assert_eq!(text, "x = 1");
            assert_eq!(collect_deltas(rx), vec!["x = 1"]);
        });
    }

    #[test]
    fn test_probe_checks_shape() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(body_partial_json(json!({
                    "max_tokens": 50,
                    "messages": [{"role": "user", "content": "Say \"Hello, World!\""}]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"content": "Hello, World!"}}]
                })))
                .mount(&server)
                .await;
            assert!(provider(&server.uri()).probe().await.is_ok());
        });

        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
                .mount(&server)
                .await;
            let err = provider(&server.uri()).probe().await.unwrap_err();
            assert!(matches!(err, GenerationError::ResponseFormat(_)));
        });
    }
}
