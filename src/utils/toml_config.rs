//! TOML-based configuration for labrelay
//!
//! Declarative configuration for the coordination server, the AI providers
//! and the client manager, read from `labrelay.toml`.
//!
//! # Hot Reloading
//!
//! Configuration changes are detected and applied at runtime.
//! Use [`ConfigManager`] for thread-safe access to the current configuration.

use crate::llm::client::{ProviderConfig, ProviderKind};
use crate::llm::cost::ModelPricing;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from labrelay.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Named AI provider configurations
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,

    #[serde(default)]
    pub manager: ManagerConfig,

    /// Per-model pricing, USD per 1k tokens
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Reported in `registration_confirmed`; random when unset
    #[serde(default)]
    pub server_id: Option<String>,

    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// 0 disables task expiry
    #[serde(default)]
    pub task_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub fail_tasks_on_disconnect: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_heartbeat_timeout() -> u64 {
    90
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            server_id: None,
            send_queue_capacity: default_send_queue_capacity(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            task_timeout_secs: 0,
            fail_tasks_on_disconnect: true,
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    pub model: String,

    /// Defaults per provider type when unset
    #[serde(default)]
    pub api_base: Option<String>,

    /// Environment variable holding the API key (not needed for ollama)
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl ProviderSettings {
    /// Build the adapter configuration for the provider called `name`.
    pub fn to_provider_config(&self, name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: self.kind,
            model: self.model.clone(),
            api_base: self
                .api_base
                .clone()
                .unwrap_or_else(|| self.kind.default_api_base().to_string()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
            embedding_model: self.embedding_model.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn requires_api_key(&self) -> bool {
        self.kind != ProviderKind::Ollama
    }
}

// ============= Manager Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Explicit selection order; defaults to the order providers were loaded
    #[serde(default)]
    pub provider_order: Option<Vec<String>>,

    #[serde(default)]
    pub participation: ParticipationConfig,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            provider_order: None,
            participation: ParticipationConfig::default(),
        }
    }
}

/// Weights for the multi-participant scoring heuristic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipationConfig {
    #[serde(default = "default_base_chance")]
    pub base_chance: f64,

    #[serde(default = "default_question_boost")]
    pub question_boost: f64,

    #[serde(default = "default_engagement_boost")]
    pub engagement_boost: f64,

    /// Number of recent turns checked for dominance
    #[serde(default = "default_dominance_window")]
    pub dominance_window: usize,

    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_chance() -> f64 {
    0.3
}

fn default_question_boost() -> f64 {
    0.3
}

fn default_engagement_boost() -> f64 {
    0.2
}

fn default_dominance_window() -> usize {
    3
}

fn default_jitter() -> f64 {
    0.05
}

impl Default for ParticipationConfig {
    fn default() -> Self {
        Self {
            base_chance: default_base_chance(),
            question_boost: default_question_boost(),
            engagement_boost: default_engagement_boost(),
            dominance_window: default_dominance_window(),
            jitter: default_jitter(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' listed in manager.provider_order does not exist")]
    MissingProvider(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate internal consistency.
    ///
    /// Key variables are not read here; a provider whose key is missing is
    /// skipped when the client manager is built. See [`Self::check_credentials`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in &self.providers {
            if provider.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' has an empty model",
                    name
                )));
            }
            if provider.requires_api_key() && provider.api_key_env.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' requires api_key_env",
                    name
                )));
            }
        }

        if let Some(order) = &self.manager.provider_order {
            for name in order {
                if !self.providers.contains_key(name) {
                    return Err(ConfigError::MissingProvider(name.clone()));
                }
            }
        }

        let p = &self.manager.participation;
        for (field, value) in [
            ("base_chance", p.base_chance),
            ("question_boost", p.question_boost),
            ("engagement_boost", p.engagement_boost),
            ("jitter", p.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "manager.participation.{} must be a finite non-negative number",
                    field
                )));
            }
        }

        if !matches!(self.server.log_format.as_str(), "pretty" | "json") {
            warn!(
                log_format = %self.server.log_format,
                "unknown log_format, falling back to pretty"
            );
        }

        Ok(())
    }

    /// Check that every provider's `api_key_env` variable is set.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        for provider in self.providers.values() {
            if let Some(env) = provider.api_key_env.as_deref() {
                std::env::var(env).map_err(|_| ConfigError::MissingEnvVar(env.to_string()))?;
            }
        }
        Ok(())
    }

    /// Provider names in selection order.
    pub fn provider_names(&self) -> Vec<String> {
        match &self.manager.provider_order {
            Some(order) => order.clone(),
            None => self.providers.keys().cloned().collect(),
        }
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<AppConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ConfigManager {
    /// Create a manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = AppConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a manager directly from a config. No file watching.
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("labrelay.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Current configuration (lockless read)
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the configuration from disk. The previous config stays on error.
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = AppConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching the config file for changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);
            let mut last_reload: Option<std::time::Instant> = None;

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|at| at.elapsed() < debounce) {
                    continue;
                }

                // Let the write finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match AppConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::from_config(AppConfig::default())
    }
}
