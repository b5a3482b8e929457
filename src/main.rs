//! labrelay server binary.
//!
//! Usage:
//!   labrelay-server                       # serve using labrelay.toml
//!   labrelay-server --config lab.toml --port 9000 --watch
//!   labrelay-server init --providers ollama,openai
//!   labrelay-server config --validate

use anyhow::Context;
use labrelay::{
    AppConfig, AppState, ConfigManager, CoordinationServer, CoordinatorOptions,
    api,
    cli::{
        Cli, Commands,
        init::{self, InitConfig, InitResult},
        output::{KeyState, Output},
    },
    server::spawn_sweeper,
    utils::toml_config::{ConfigError, ServerConfig},
};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Some(Commands::Init {
            path,
            force,
            providers,
        }) => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    providers,
                },
                &output,
            );
            return Ok(match result {
                InitResult::Success => ExitCode::SUCCESS,
                InitResult::AlreadyExists | InitResult::Error(_) => ExitCode::FAILURE,
            });
        }
        Some(Commands::Config { validate }) => {
            return Ok(show_config(&cli.config, validate, &output));
        }
        None => {}
    }

    // Keep the load result until tracing is up so the outcome gets logged.
    let loaded = ConfigManager::new(&cli.config);
    let (config_manager, fallback) = match loaded {
        Ok(manager) => (Arc::new(manager), false),
        Err(ConfigError::FileNotFound(_)) => {
            (Arc::new(ConfigManager::from_config(AppConfig::default())), true)
        }
        Err(e) => {
            output.error(&format!("Invalid configuration {}: {}", cli.config.display(), e));
            return Ok(ExitCode::FAILURE);
        }
    };

    let config = config_manager.config();
    init_tracing(&config.server);

    if fallback {
        tracing::warn!(
            path = %cli.config.display(),
            "configuration file not found, using defaults"
        );
    } else {
        tracing::info!(path = %config_manager.path().display(), "configuration loaded");
    }
    if let Err(e) = config.check_credentials() {
        tracing::warn!(error = %e, "provider credentials incomplete");
    }

    if cli.watch {
        if fallback {
            tracing::warn!("--watch ignored: no configuration file to watch");
        } else {
            config_manager
                .start_watching()
                .context("failed to watch configuration file")?;
            tracing::info!("configuration hot reload enabled");
        }
    }

    let server = Arc::new(CoordinationServer::new(CoordinatorOptions::from(
        &config.server,
    )));
    let sweeper = spawn_sweeper(server.clone(), config_manager.clone());

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", host, port))?;

    if host == "0.0.0.0" {
        tracing::warn!("binding to all interfaces; the coordination endpoint has no authentication");
    }

    let app = api::app(AppState::new(config_manager.clone(), server.clone()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        %addr,
        server_id = server.server_id(),
        "labrelay listening (ws://{}/ws)",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    config_manager.stop_watching();
    tracing::info!("shutdown complete");
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},labrelay={},tower_http=info", server.log_level, server.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if server.log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn show_config(path: &std::path::Path, validate: bool, output: &Output) -> ExitCode {
    let config = match AppConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            output.error(&format!("{}: {}", path.display(), e));
            return ExitCode::FAILURE;
        }
    };

    if validate {
        if let Err(e) = config.check_credentials() {
            output.error(&format!("{}: {}", path.display(), e));
            return ExitCode::FAILURE;
        }
        output.success(&format!("{} is valid", path.display()));
        return ExitCode::SUCCESS;
    }

    output.header("Server");
    output.kv("bind", &format!("{}:{}", config.server.host, config.server.port));
    output.kv("log", &format!("{} ({})", config.server.log_level, config.server.log_format));
    output.kv(
        "heartbeat timeout",
        &format!("{}s", config.server.heartbeat_timeout_secs),
    );
    let task_timeout = match config.server.task_timeout_secs {
        0 => "disabled".to_string(),
        n => format!("{}s", n),
    };
    output.kv("task timeout", &task_timeout);

    output.header("Providers");
    if config.providers.is_empty() {
        output.info("none configured");
    }
    for (name, provider) in &config.providers {
        output.provider(
            name,
            &format!("{} / {}", provider.kind, provider.model),
            KeyState::of(provider.api_key_env.as_deref()),
        );
    }
    output.kv("max retries", &config.manager.max_retries.to_string());
    output.hint("Run with --validate to only check the file");
    ExitCode::SUCCESS
}
