//! Provider client abstractions
//!
//! Every text-generation backend is normalized behind [`ProviderClient`]:
//! - **OpenAI-compatible**: OpenAI, xAI and Ollama's `/v1` endpoint
//! - **Anthropic**: the Messages API
//!
//! One client owns one credential and one [`ProviderConfig`].

use crate::types::{AppError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Characters per token used by [`estimate_tokens`] unless overridden.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Metadata key that overrides [`DEFAULT_CHARS_PER_TOKEN`].
pub const CHARS_PER_TOKEN_KEY: &str = "chars_per_token";

/// Which wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn default_api_base(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Build a client for this provider kind.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Configuration`] if a hosted provider has no API key
    /// or the HTTP client cannot be built.
    pub fn create_client(
        self,
        api_key: String,
        config: ProviderConfig,
    ) -> Result<Arc<dyn ProviderClient>> {
        if self != ProviderKind::Ollama && api_key.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "provider '{}' has no API key",
                config.name
            )));
        }

        match self {
            ProviderKind::OpenAI | ProviderKind::Ollama => Ok(Arc::new(
                super::openai::OpenAiCompatibleClient::new(api_key, config)?,
            )),
            ProviderKind::Anthropic => Ok(Arc::new(super::anthropic::AnthropicClient::new(
                api_key, config,
            )?)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        };
        f.write_str(s)
    }
}

/// Immutable settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Registry name, e.g. `openai` or `xai`
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            api_base: kind.default_api_base().to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: None,
            embedding_model: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Parameters for one generation call. Unset fields fall back to the
/// provider's [`ProviderConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<impl Into<String>>) -> Self {
        self.system_prompt = system_prompt.map(Into::into);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature_or(&self, config: &ProviderConfig) -> f32 {
        self.temperature.unwrap_or(config.temperature)
    }

    pub fn max_tokens_or(&self, config: &ProviderConfig) -> u32 {
        self.max_tokens.unwrap_or(config.max_tokens)
    }

    pub fn system_prompt_or<'a>(&'a self, config: &'a ProviderConfig) -> Option<&'a str> {
        self.system_prompt
            .as_deref()
            .or(config.system_prompt.as_deref())
    }
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Text produced by one non-streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// `None` when the provider did not report usage
    pub usage: Option<TokenUsage>,
}

/// Incremental text chunks from a streaming call.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Uniform interface over one text-generation provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    /// Generate a full completion.
    async fn generate(&self, request: &GenerateRequest) -> Result<Completion>;

    /// Stream a completion as text deltas.
    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream>;

    /// Embed `text` into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Best-effort token count for cost estimation. Never fails.
    fn estimate_tokens(&self, text: &str) -> u32 {
        estimate_tokens(text, &self.config().metadata)
    }
}

/// Character-count token heuristic.
///
/// Honours a `chars_per_token` metadata override. An unusable override is
/// logged and yields 0.
pub fn estimate_tokens(text: &str, metadata: &HashMap<String, String>) -> u32 {
    let chars_per_token = match metadata.get(CHARS_PER_TOKEN_KEY) {
        None => DEFAULT_CHARS_PER_TOKEN,
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0.0 => value,
            _ => {
                tracing::warn!(value = %raw, "invalid chars_per_token override, token estimate skipped");
                return 0;
            }
        },
    };

    let chars = text.chars().count() as f64;
    (chars / chars_per_token).ceil().min(u32::MAX as f64) as u32
}

/// Map a reqwest transport failure to an adapter error whose text the
/// manager's classifier recognizes.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        "network timeout"
    } else if err.is_connect() {
        "network connection failed"
    } else {
        "request failed"
    };
    AppError::LLM(format!("{} {}: {}", provider, kind, err))
}

/// Build the error for a non-success HTTP response.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::LLM(format!("{} API error {}: {}", provider, status.as_u16(), body))
}
