//! AI provider clients and the manager above them
//!
//! # Architecture
//!
//! - [`ProviderClient`] - the trait every provider adapter implements
//! - [`ProviderHealthTracker`] - consecutive-failure counts per provider
//! - [`ParticipantCoordinator`] - who speaks next, or who joins a turn
//! - [`CostTracker`] - estimated and actual cost records
//! - [`AiClientManager`] - retry, failover, streaming and cost accounting
//!
//! # Supported Providers
//!
//! - `openai` - OpenAI and any compatible API (xAI, OpenRouter, ...)
//! - `ollama` - local Ollama through its OpenAI-compatible endpoint
//! - `anthropic` - Claude through the Messages API
//!
//! # Streaming
//!
//! [`AiClientManager::generate_text`] yields [`StreamEvent`]s. Use
//! [`collect_stream_text`] to get plain text that is safe across failover.

pub mod anthropic;
pub mod client;
pub mod cost;
pub mod credentials;
pub mod health;
pub mod manager;
pub mod openai;
pub mod participants;

pub use client::{
    Completion, GenerateRequest, ProviderClient, ProviderConfig, ProviderKind, TextStream,
    TokenUsage, estimate_tokens,
};
pub use cost::{CostKind, CostLedger, CostRecord, CostTracker, ModelPricing};
pub use credentials::{CredentialSource, EnvCredentialSource};
pub use health::ProviderHealthTracker;
pub use manager::{AiClientManager, ProviderReply, StreamEvent, collect_stream_text};
pub use participants::ParticipantCoordinator;
