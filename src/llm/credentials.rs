//! Where provider credentials come from.
//!
//! The client manager only needs `(api_key, ProviderConfig)` pairs; how they
//! are stored is up to the [`CredentialSource`] it is built from.

use crate::llm::client::ProviderConfig;
use crate::types::{AppError, Result};
use crate::utils::toml_config::AppConfig;

/// Supplies an API key and configuration per provider.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialSource: Send + Sync {
    /// Provider names in preferred selection order.
    fn provider_names(&self) -> Vec<String>;

    fn load(&self, provider: &str) -> Result<(String, ProviderConfig)>;
}

/// Reads provider settings from [`AppConfig`] and keys from the environment.
pub struct EnvCredentialSource {
    config: AppConfig,
}

impl EnvCredentialSource {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl CredentialSource for EnvCredentialSource {
    fn provider_names(&self) -> Vec<String> {
        self.config.provider_names()
    }

    fn load(&self, provider: &str) -> Result<(String, ProviderConfig)> {
        let settings = self.config.providers.get(provider).ok_or_else(|| {
            AppError::Configuration(format!("provider '{}' is not configured", provider))
        })?;

        let api_key = match settings.api_key_env.as_deref() {
            Some(env) => std::env::var(env).map_err(|_| {
                AppError::Configuration(format!(
                    "environment variable '{}' for provider '{}' is not set",
                    env, provider
                ))
            })?,
            None => String::new(),
        };

        Ok((api_key, settings.to_provider_config(provider)))
    }
}
