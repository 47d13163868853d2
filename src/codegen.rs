//! Code generation entry point.
//!
//! ```text
//! prompt + ProviderConfig
//!     |  validate (prompt, key shape, base URL)   no I/O
//!     v
//! LlmProvider::generate        one HTTP round trip
//!     |
//!     v
//! sanitize                     strip fences, tags, prose
//!     |
//!     v
//! Python source
//! ```
//!
//! Nothing here persists anything; recording history is up to the caller.

use tokio::sync::mpsc;

use crate::error::{GenerationError, GenerationResult};
use crate::llm::{create_provider, LlmProvider, ProviderSettings};
use crate::sanitize::sanitize;
use crate::types::{ConnectionStatus, ProviderConfig, StreamChunk};

pub struct CodeGenerator {
    settings: ProviderSettings,
}

impl CodeGenerator {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    /// Validate inputs and build the provider. Fails before any request.
    fn prepare(
        &self,
        prompt: &str,
        config: Option<&ProviderConfig>,
    ) -> GenerationResult<(ProviderConfig, Box<dyn LlmProvider>)> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::Validation("Please enter a prompt".to_string()));
        }
        let config = config.ok_or_else(|| {
            GenerationError::Validation(
                "LLM provider is not configured. Run `pyrunner configure` first".to_string(),
            )
        })?;
        config.validate()?;
        let provider = create_provider(config, &self.settings)?;
        Ok((config.clone(), provider))
    }

    /// Generate Python source for `prompt`.
    pub async fn generate_code(
        &self,
        prompt: &str,
        config: Option<&ProviderConfig>,
    ) -> GenerationResult<String> {
        let (config, provider) = self.prepare(prompt, config)?;
        let raw = provider.generate(prompt).await.inspect_err(log_failure)?;
        Ok(finish(&config, &raw))
    }

    /// Like `generate_code`, forwarding raw text deltas as they arrive.
    ///
    /// Deltas are the unsanitized reply; the returned value is the cleaned
    /// code for the whole reply.
    pub async fn generate_code_stream(
        &self,
        prompt: &str,
        config: Option<&ProviderConfig>,
        chunk_tx: mpsc::UnboundedSender<StreamChunk>,
    ) -> GenerationResult<String> {
        let (config, provider) = self.prepare(prompt, config)?;
        let raw = provider
            .generate_stream(prompt, chunk_tx)
            .await
            .inspect_err(log_failure)?;
        Ok(finish(&config, &raw))
    }

    /// Check that the configured credentials work, without generating code.
    pub async fn test_connection(&self, config: &ProviderConfig) -> ConnectionStatus {
        if let Err(e) = config.validate() {
            return ConnectionStatus::failed(e.to_string());
        }
        let provider = match create_provider(config, &self.settings) {
            Ok(provider) => provider,
            Err(e) => return ConnectionStatus::failed(e.to_string()),
        };
        match provider.probe().await {
            Ok(()) => {
                tracing::info!(provider = %config.provider, "connection test passed");
                ConnectionStatus::ok()
            }
            Err(e) => {
                log_failure(&e);
                ConnectionStatus::failed(e.to_string())
            }
        }
    }
}

fn finish(config: &ProviderConfig, raw: &str) -> String {
    let code = sanitize(raw, config.provider);
    tracing::info!(
        provider = %config.provider,
        model = config.model(),
        raw_chars = raw.len(),
        code_chars = code.len(),
        "code generated"
    );
    code
}

fn log_failure(err: &GenerationError) {
    match err {
        GenerationError::ResponseFormat(detail) => {
            tracing::warn!("unexpected response shape: {}", detail)
        }
        other => tracing::warn!("provider call failed: {}", other),
    }
}
