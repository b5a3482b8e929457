//! Init command implementation
//!
//! Scaffolds a labrelay deployment directory: `labrelay.toml` and `.env.example`.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug, PartialEq, Eq)]
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// labrelay.toml already exists and --force was not given
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Provider presets to write (ollama, openai, anthropic, xai)
    pub providers: Vec<String>,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing labrelay");

    let base_path = &config.path;
    let config_path = base_path.join("labrelay.toml");
    if config_path.exists() && !config.force {
        output.warning("labrelay.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    let unknown: Vec<&String> = config
        .providers
        .iter()
        .filter(|p| provider_section(p).is_none())
        .collect();
    if !unknown.is_empty() {
        let message = format!(
            "Unknown provider preset(s): {}",
            unknown
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        output.error(&message);
        output.hint("Choose from: ollama, openai, anthropic, xai");
        return InitResult::Error(message);
    }

    if let Err(e) = fs::create_dir_all(base_path) {
        output.error(&format!("Failed to create {}: {}", base_path.display(), e));
        return InitResult::Error(e.to_string());
    }

    if let Err(e) = write_file(&config_path, &generate_config(&config.providers), config.force) {
        output.error(&format!("Failed to write labrelay.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "labrelay.toml");

    let env_path = base_path.join(".env.example");
    if let Err(e) = write_file(&env_path, &generate_env_example(&config.providers), config.force) {
        output.error(&format!("Failed to write .env.example: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("env", ".env.example");

    output.success("Project initialized");
    output.hint("Copy .env.example to .env and fill in the API keys");
    output.hint("Start the server with: labrelay-server");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn provider_section(name: &str) -> Option<&'static str> {
    let section = match name {
        "ollama" => {
            r#"# Local Ollama (no API key needed)
[providers.ollama]
type = "ollama"
model = "llama3.2"
api_base = "http://localhost:11434/v1"
"#
        }
        "openai" => {
            r#"# OpenAI (set OPENAI_API_KEY in .env)
[providers.openai]
type = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
"#
        }
        "anthropic" => {
            r#"# Anthropic (set ANTHROPIC_API_KEY in .env)
[providers.claude]
type = "anthropic"
model = "claude-3-5-sonnet-latest"
api_key_env = "ANTHROPIC_API_KEY"
"#
        }
        "xai" => {
            r#"# xAI through its OpenAI-compatible API (set XAI_API_KEY in .env)
[providers.xai]
type = "openai"
model = "grok-2"
api_base = "https://api.x.ai/v1"
api_key_env = "XAI_API_KEY"
"#
        }
        _ => return None,
    };
    Some(section)
}

fn generate_config(providers: &[String]) -> String {
    let mut out = String::from(
        r#"# labrelay configuration
# ======================

[server]
host = "127.0.0.1"
port = 3000
log_level = "info"
log_format = "pretty"        # or "json"
send_queue_capacity = 256
heartbeat_timeout_secs = 90
sweep_interval_secs = 30
task_timeout_secs = 0        # 0 disables task timeouts
fail_tasks_on_disconnect = true

[manager]
max_retries = 3

[manager.participation]
base_chance = 0.3
question_boost = 0.3
engagement_boost = 0.2
dominance_window = 3
jitter = 0.05

"#,
    );

    for name in providers {
        if let Some(section) = provider_section(name) {
            out.push_str(section);
            out.push('\n');
        }
    }

    out.push_str(
        r#"# USD per 1k tokens, keyed by model name
[pricing."gpt-4o-mini"]
input_per_1k = 0.00015
output_per_1k = 0.0006
"#,
    );
    out
}

fn generate_env_example(providers: &[String]) -> String {
    let mut out = String::from(
        r#"# labrelay environment variables
# Copy this file to .env and fill in the values.

# Optional: logging filter (overrides server.log_level)
RUST_LOG=info,labrelay=debug
"#,
    );
    for name in providers {
        let line = match name.as_str() {
            "openai" => "OPENAI_API_KEY=sk-...",
            "anthropic" => "ANTHROPIC_API_KEY=sk-ant-...",
            "xai" => "XAI_API_KEY=xai-...",
            _ => continue,
        };
        out.push('\n');
        out.push_str(line);
        out.push('\n');
    }
    out
}
