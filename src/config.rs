//! Configuration management for pyrunner.
//!
//! Application settings live in `~/.pyrunner/config.toml`. Provider
//! credentials are not kept here; they are user data and go through the
//! settings store (see `settings.rs`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::ProviderSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Base URLs of the fixed-endpoint providers.
///
/// Overriding these is useful behind a proxy; OpenAI-compatible servers
/// take their URL from the provider settings instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoints {
    #[serde(default = "default_openai_base")]
    pub openai: String,
    #[serde(default = "default_anthropic_base")]
    pub anthropic: String,
    #[serde(default = "default_gemini_base")]
    pub gemini: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for settings and history documents. Defaults to
    /// `~/.pyrunner/store`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_request_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    "You are a Python code generator. Generate clean, efficient, and well-documented \
     Python code based on the user's request. Include comments explaining the code and \
     any necessary imports. Only respond with the code, no additional explanations."
        .to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_runner_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai: default_openai_base(),
            anthropic: default_anthropic_base(),
            gemini: default_gemini_base(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_runner_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            endpoints: Endpoints::default(),
            runner: RunnerConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".pyrunner"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("PYRUNNER_STORE_DIR") {
            config.storage.dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var("PYRUNNER_LOG") {
            config.log.level = level;
        }
        if let Ok(python) = std::env::var("PYRUNNER_PYTHON") {
            config.runner.python = python;
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(config_path)
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        match &self.storage.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::home_dir()?.join("store")),
        }
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            max_tokens: self.llm.max_tokens,
            system_prompt: self.llm.system_prompt.clone(),
            timeout: Duration::from_secs(self.llm.request_timeout_secs),
            endpoints: self.endpoints.clone(),
        }
    }
}
