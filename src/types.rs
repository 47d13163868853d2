//! Core data types used throughout pyrunner.
//!
//! This module defines the provider selection, the credentials that go
//! with it, and the small result types that flow between the generator,
//! the providers and the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

// --- Provider ---

/// The LLM backends pyrunner knows how to talk to.
///
/// The serialized names match what is stored in settings and history
/// documents, so they must stay stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Provider {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "Anthropic")]
    Anthropic,
    #[serde(rename = "Google Gemini")]
    GoogleGemini,
    #[serde(rename = "OpenAI Compatible")]
    OpenAiCompatible,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::GoogleGemini,
        Provider::OpenAiCompatible,
    ];

    /// Display name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::GoogleGemini => "Google Gemini",
            Provider::OpenAiCompatible => "OpenAI Compatible",
        }
    }

    /// Model used when the configuration leaves `model_name` empty.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-sonnet-latest",
            Provider::GoogleGemini => "gemini-1.5-flash",
            Provider::OpenAiCompatible => "gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google gemini" | "gemini" | "google" | "google_gemini" | "google-gemini" => {
                Ok(Provider::GoogleGemini)
            }
            "openai compatible" | "openai-compatible" | "openai_compatible" | "compatible" => {
                Ok(Provider::OpenAiCompatible)
            }
            _ => Err(GenerationError::UnsupportedProvider(s.to_string())),
        }
    }
}

// --- Provider Config ---

/// Provider selection plus credentials, as persisted in settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
    /// Only meaningful for OpenAI-compatible endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model_name: String::new(),
            base_url: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The configured model, or the provider default when none is set.
    pub fn model(&self) -> &str {
        if self.model_name.trim().is_empty() {
            self.provider.default_model()
        } else {
            self.model_name.trim()
        }
    }

    /// Check every invariant that must hold before a network call.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let check = crate::validation::validate_key(self.provider, &self.api_key);
        if !check.is_valid {
            return Err(GenerationError::Validation(
                check.error.unwrap_or_else(|| "Invalid API key".to_string()),
            ));
        }

        let base_url = self.base_url.as_deref().map(str::trim).unwrap_or("");
        match self.provider {
            Provider::OpenAiCompatible if base_url.is_empty() => Err(GenerationError::Validation(
                "Base URL is required for OpenAI Compatible providers".to_string(),
            )),
            Provider::OpenAiCompatible => Ok(()),
            other if !base_url.is_empty() => Err(GenerationError::Validation(format!(
                "Base URL is only supported for OpenAI Compatible providers, not {}",
                other
            ))),
            _ => Ok(()),
        }
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), tail)
    }
}

// --- Connection Status ---

/// Outcome of a connection test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

// --- Stream Chunk ---

/// A single chunk from a streaming LLM response.
///
/// Deltas are sent in the order they arrive; `Done` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A piece of text content
    TextDelta(String),
    /// The stream is complete
    Done,
}
