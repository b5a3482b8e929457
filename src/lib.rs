//! # labrelay
//!
//! Coordination server for research agents, plus a failover-aware client
//! manager for several AI providers.
//!
//! ## Overview
//!
//! labrelay can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `labrelay-server` binary
//! 2. **As a library** - Embed the coordinator or the client manager in your own project
//!
//! ## Coordination
//!
//! Agents connect over WebSocket, declare a type and a set of capabilities,
//! and receive `task_request`s. Gateways submit `research_action`s and get the
//! matching `task_result` back.
//!
//! ```rust,ignore
//! use labrelay::server::{CoordinationServer, CoordinatorOptions};
//!
//! let server = CoordinationServer::new(CoordinatorOptions::default());
//! let (agent, mut agent_rx) = server.connect();
//! server.handle_message(
//!     &agent,
//!     r#"{"type":"agent_register","agent_id":"lit-1","agent_type":"literature","capabilities":["search"]}"#,
//! );
//! ```
//!
//! ## Client Manager
//!
//! ```rust,ignore
//! use labrelay::{AiClientManager, AppConfig, collect_stream_text};
//!
//! let config = AppConfig::load("labrelay.toml")?;
//! let manager = AiClientManager::from_config(&config)?;
//!
//! let answer = manager.get_response("openai", "Summarise this abstract", None).await?;
//! let streamed = collect_stream_text(manager.generate_text("Hello", None, None)).await?;
//! ```
//!
//! ## Modules
//!
//! - [`api`] - HTTP routes and the WebSocket upgrade
//! - [`cli`] - Command-line interface of the server binary
//! - [`llm`] - Provider adapters and the client manager
//! - [`protocol`] - Wire messages
//! - [`server`] - Registry, routing, liveness and the coordinator
//! - [`types`] - Common types and error handling
//! - [`utils`] - TOML configuration with hot reload

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface for the server binary.
pub mod cli;
/// AI provider clients and the client manager.
pub mod llm;
/// Coordination wire protocol.
pub mod protocol;
/// Agent registry, task routing and the coordination server.
pub mod server;
/// Core types (errors, task status).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use llm::{AiClientManager, ProviderClient, StreamEvent, collect_stream_text};
pub use protocol::{InboundMessage, OutboundMessage};
pub use server::{CoordinationServer, CoordinatorOptions};
pub use types::{AppError, Result};
pub use utils::toml_config::{AppConfig, ConfigManager};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config: Arc<ConfigManager>,
    /// The coordination server behind `/ws`
    pub server: Arc<CoordinationServer>,
}

impl AppState {
    pub fn new(config: Arc<ConfigManager>, server: Arc<CoordinationServer>) -> Self {
        Self { config, server }
    }
}
