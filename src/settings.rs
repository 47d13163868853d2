//! Persisted provider settings.

use anyhow::{Context, Result};

use crate::store::Store;
use crate::types::ProviderConfig;

pub const SETTINGS_KEY: &str = "llm-provider-config";

pub fn load_provider_config(store: &dyn Store) -> Result<Option<ProviderConfig>> {
    let Some(content) = store.get(SETTINGS_KEY)? else {
        return Ok(None);
    };
    if content.trim().is_empty() || content.trim() == "null" {
        return Ok(None);
    }
    let config = serde_json::from_str(&content).context("Failed to parse saved provider settings")?;
    Ok(Some(config))
}

/// Replace the saved settings. Callers validate first.
pub fn save_provider_config(store: &dyn Store, config: &ProviderConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    store.set(SETTINGS_KEY, &content)?;
    tracing::info!(provider = %config.provider, "provider settings saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Provider;

    #[test]
    fn test_missing_settings() {
        let store = MemoryStore::new();
        assert!(load_provider_config(&store).unwrap().is_none());
        store.set(SETTINGS_KEY, "null").unwrap();
        assert!(load_provider_config(&store).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let config = ProviderConfig::new(Provider::OpenAiCompatible, "local-key-1")
            .with_model("llama3")
            .with_base_url("http://localhost:11434/v1");
        save_provider_config(&store, &config).unwrap();
        assert_eq!(load_provider_config(&store).unwrap(), Some(config));
    }

    #[test]
    fn test_reads_document_without_base_url() {
        let store = MemoryStore::new();
        store
            .set(
                SETTINGS_KEY,
                r#"{"provider":"Google Gemini","apiKey":"k","modelName":"gemini-pro"}"#,
            )
            .unwrap();
        let config = load_provider_config(&store).unwrap().unwrap();
        assert_eq!(config.provider, Provider::GoogleGemini);
        assert_eq!(config.model_name, "gemini-pro");
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let store = MemoryStore::new();
        store
            .set(SETTINGS_KEY, r#"{"provider":"Cohere","apiKey":"k"}"#)
            .unwrap();
        assert!(load_provider_config(&store).is_err());
    }
}
