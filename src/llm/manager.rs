//! AI client manager
//!
//! Sits above N [`ProviderClient`]s and adds:
//!
//! - bounded same-provider retry with health tracking
//! - provider selection through the [`ParticipantCoordinator`]
//! - streaming with failover to a different provider
//! - estimated and actual cost records per call
//!
//! # Example
//!
//! ```rust,ignore
//! use labrelay::llm::{AiClientManager, collect_stream_text};
//!
//! let manager = AiClientManager::from_config(&config)?;
//! let answer = manager.get_response("openai", "Summarize this abstract", None).await?;
//!
//! let text = collect_stream_text(manager.generate_text("Draft an outline", None, None)).await?;
//! ```

use crate::llm::client::{Completion, GenerateRequest, ProviderClient, TokenUsage};
use crate::llm::cost::{CostLedger, CostTracker};
use crate::llm::credentials::{CredentialSource, EnvCredentialSource};
use crate::llm::health::ProviderHealthTracker;
use crate::llm::participants::ParticipantCoordinator;
use crate::types::{AppError, Result};
use crate::utils::toml_config::{AppConfig, ManagerConfig};
use futures::StreamExt;
use futures::stream::{BoxStream, Stream};
use serde::Serialize;
use std::sync::Arc;

/// One item of a [`AiClientManager::generate_text`] stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Delta {
        provider: String,
        text: String,
    },
    /// `from` failed mid-request and the request restarts on `to`.
    /// The `discarded` deltas emitted so far belong to the abandoned attempt.
    Failover {
        from: String,
        to: String,
        discarded: usize,
    },
    Done {
        provider: String,
    },
    Error {
        provider: Option<String>,
        message: String,
    },
}

/// One provider's answer from [`AiClientManager::respond_all`].
#[derive(Debug)]
pub struct ProviderReply {
    pub provider: String,
    pub result: Result<String>,
}

pub struct AiClientManager {
    clients: Vec<Arc<dyn ProviderClient>>,
    health: ProviderHealthTracker,
    participants: ParticipantCoordinator,
    cost: Option<Arc<dyn CostTracker>>,
    max_retries: u32,
}

impl AiClientManager {
    /// Empty manager. Providers are added with [`Self::register`].
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            clients: Vec::new(),
            health: ProviderHealthTracker::new(config.max_retries.max(1)),
            participants: ParticipantCoordinator::new(config.participation.clone()),
            cost: None,
            max_retries: config.max_retries,
        }
    }

    /// Build clients for every provider `source` knows about.
    ///
    /// Providers that fail to load are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Configuration`] if no provider could be loaded.
    pub fn from_credentials(source: &dyn CredentialSource, config: &ManagerConfig) -> Result<Self> {
        let mut manager = Self::new(config);

        for name in source.provider_names() {
            let client = source
                .load(&name)
                .and_then(|(api_key, provider)| provider.kind.create_client(api_key, provider));
            match client {
                Ok(client) => {
                    tracing::info!(provider = %name, model = %client.config().model, "provider ready");
                    manager.register(client);
                }
                Err(e) => tracing::warn!(provider = %name, error = %e, "skipping provider"),
            }
        }

        if manager.clients.is_empty() {
            return Err(AppError::Configuration(
                "no AI providers could be initialized".to_string(),
            ));
        }
        Ok(manager)
    }

    /// Providers from `[providers]`, keys from the environment, costs priced
    /// from `[pricing]`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source = EnvCredentialSource::new(config.clone());
        let ledger = CostLedger::new(config.pricing.clone());
        Ok(Self::from_credentials(&source, &config.manager)?.with_cost_tracker(Arc::new(ledger)))
    }

    pub fn with_cost_tracker(mut self, tracker: Arc<dyn CostTracker>) -> Self {
        self.cost = Some(tracker);
        self
    }

    pub fn with_participants(mut self, participants: ParticipantCoordinator) -> Self {
        self.participants = participants;
        self
    }

    /// Add a client, replacing any client with the same name.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        match self.clients.iter().position(|c| c.name() == client.name()) {
            Some(idx) => self.clients[idx] = client,
            None => self.clients.push(client),
        }
    }

    pub fn client(&self, provider: &str) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.iter().find(|c| c.name() == provider)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    /// Providers whose failure count is below the limit, in registration order.
    pub fn available_providers(&self) -> Vec<String> {
        self.health.available(&self.provider_names())
    }

    pub fn health(&self) -> &ProviderHealthTracker {
        &self.health
    }

    pub fn participants(&self) -> &ParticipantCoordinator {
        &self.participants
    }

    pub fn cost_tracker(&self) -> Option<&Arc<dyn CostTracker>> {
        self.cost.as_ref()
    }

    /// Sum of actual costs, 0 when no tracker is attached.
    pub fn total_cost(&self) -> f64 {
        self.cost.as_ref().map(|c| c.total_cost()).unwrap_or(0.0)
    }

    /// Next provider in turn among the available ones.
    pub fn select_provider(&self) -> Option<String> {
        self.participants
            .select_participant(&self.available_providers())
    }

    fn select_provider_excluding(&self, tried: &[String]) -> Option<String> {
        let candidates: Vec<String> = self
            .available_providers()
            .into_iter()
            .filter(|p| !tried.contains(p))
            .collect();
        self.participants.select_participant(&candidates)
    }

    /// Generate a full response from one provider.
    ///
    /// Retries the same provider up to `max_retries` times while it stays
    /// available. Fails immediately with [`AppError::ProviderUnavailable`] if
    /// the provider is unknown or already unhealthy; otherwise the last
    /// failure is classified as [`AppError::Network`] or [`AppError::Api`].
    pub async fn get_response(
        &self,
        provider: &str,
        message: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let client = self.client(provider).ok_or_else(|| {
            AppError::ProviderUnavailable(format!("unknown provider '{}'", provider))
        })?;
        let request = GenerateRequest::new(message).with_system_prompt(system_prompt);

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if !self.health.is_available(provider) {
                break;
            }

            self.record_estimate(client.as_ref(), &request);
            match client.generate(&request).await {
                Ok(completion) => {
                    self.health.record_success(provider);
                    self.record_actual(client.as_ref(), &request, &completion);
                    return Ok(completion.text);
                }
                Err(e) => {
                    let failures = self.health.record_failure(provider);
                    tracing::warn!(provider, attempt, failures, error = %e, "provider call failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => AppError::classify_provider_failure(provider, failure_text(e)),
            None => AppError::ProviderUnavailable(format!(
                "provider '{}' is unhealthy ({} consecutive failures)",
                provider,
                self.health.failures(provider)
            )),
        })
    }

    /// Stream a response, failing over to other providers on error.
    ///
    /// With no explicit `provider` the next one in turn is used. When a
    /// provider fails, before or during streaming, it is marked unhealthy and
    /// the whole request restarts on a provider not yet tried, announced by
    /// [`StreamEvent::Failover`]. The stream ends with exactly one
    /// [`StreamEvent::Done`] or [`StreamEvent::Error`].
    pub fn generate_text<'a>(
        &'a self,
        prompt: &str,
        provider: Option<&str>,
        system_prompt: Option<&str>,
    ) -> BoxStream<'a, StreamEvent> {
        let request = GenerateRequest::new(prompt).with_system_prompt(system_prompt);
        let requested = provider.map(str::to_string);

        Box::pin(async_stream::stream! {
            let mut tried: Vec<String> = Vec::new();
            let mut current = requested.or_else(|| self.select_provider());

            'attempts: loop {
                let name = match current.take() {
                    Some(name) => name,
                    None => {
                        yield StreamEvent::Error {
                            provider: None,
                            message: "no providers available".to_string(),
                        };
                        break 'attempts;
                    }
                };
                tried.push(name.clone());

                let client = match self.client(&name).cloned() {
                    Some(client) => client,
                    None => {
                        yield StreamEvent::Error {
                            provider: Some(name.clone()),
                            message: format!("unknown provider '{}'", name),
                        };
                        break 'attempts;
                    }
                };

                let mut emitted = 0usize;
                let failure = if !self.health.is_available(&name) {
                    AppError::ProviderUnavailable(format!("provider '{}' is unhealthy", name))
                } else {
                    self.record_estimate(client.as_ref(), &request);
                    match client.stream(&request).await {
                        Ok(mut chunks) => {
                            let mut text = String::new();
                            let mut failed = None;
                            while let Some(chunk) = chunks.next().await {
                                match chunk {
                                    Ok(delta) => {
                                        text.push_str(&delta);
                                        emitted += 1;
                                        yield StreamEvent::Delta {
                                            provider: name.clone(),
                                            text: delta,
                                        };
                                    }
                                    Err(e) => {
                                        failed = Some(e);
                                        break;
                                    }
                                }
                            }
                            match failed {
                                None => {
                                    self.health.record_success(&name);
                                    self.record_actual(
                                        client.as_ref(),
                                        &request,
                                        &Completion { text, usage: None },
                                    );
                                    yield StreamEvent::Done { provider: name.clone() };
                                    break 'attempts;
                                }
                                Some(e) => e,
                            }
                        }
                        Err(e) => e,
                    }
                };

                self.health.mark_unhealthy(&name);
                tracing::warn!(provider = %name, emitted, error = %failure, "streaming failed, failing over");

                match self.select_provider_excluding(&tried) {
                    Some(next) => {
                        yield StreamEvent::Failover {
                            from: name.clone(),
                            to: next.clone(),
                            discarded: emitted,
                        };
                        current = Some(next);
                    }
                    None => {
                        yield StreamEvent::Error {
                            provider: Some(name.clone()),
                            message: failure_text(failure),
                        };
                        break 'attempts;
                    }
                }
            }
        })
    }

    /// Ask every provider the coordinator picks for `message`, one after another.
    pub async fn respond_all(&self, message: &str, system_prompt: Option<&str>) -> Vec<ProviderReply> {
        let available = self.available_providers();
        let participants = self
            .participants
            .get_participating_providers(message, &available);

        let mut replies = Vec::with_capacity(participants.len());
        for provider in participants {
            let result = self.get_response(&provider, message, system_prompt).await;
            replies.push(ProviderReply { provider, result });
        }
        replies
    }

    /// Embed `text` with the given provider, or the next one in turn.
    pub async fn embed(&self, provider: Option<&str>, text: &str) -> Result<Vec<f32>> {
        let name = match provider {
            Some(name) => name.to_string(),
            None => self.select_provider().ok_or_else(|| {
                AppError::ProviderUnavailable("no providers available".to_string())
            })?,
        };
        let client = self.client(&name).ok_or_else(|| {
            AppError::ProviderUnavailable(format!("unknown provider '{}'", name))
        })?;
        client
            .embed(text)
            .await
            .map_err(|e| AppError::classify_provider_failure(&name, failure_text(e)))
    }

    /// Token estimate using the provider's heuristic. Unknown providers yield 0.
    pub fn estimate_tokens(&self, provider: &str, text: &str) -> u32 {
        self.client(provider)
            .map(|c| c.estimate_tokens(text))
            .unwrap_or(0)
    }

    fn input_tokens(client: &dyn ProviderClient, request: &GenerateRequest) -> u32 {
        let system = request.system_prompt_or(client.config()).unwrap_or_default();
        client
            .estimate_tokens(&request.prompt)
            .saturating_add(client.estimate_tokens(system))
    }

    fn record_estimate(&self, client: &dyn ProviderClient, request: &GenerateRequest) {
        if let Some(cost) = &self.cost {
            let record = cost.estimate_cost(
                client.name(),
                &client.config().model,
                Self::input_tokens(client, request),
                request.max_tokens_or(client.config()),
            );
            tracing::debug!(provider = %record.provider, model = %record.model, cost = record.cost, "estimated cost");
        }
    }

    fn record_actual(&self, client: &dyn ProviderClient, request: &GenerateRequest, completion: &Completion) {
        if let Some(cost) = &self.cost {
            let usage = completion.usage.unwrap_or_else(|| TokenUsage {
                input_tokens: Self::input_tokens(client, request),
                output_tokens: client.estimate_tokens(&completion.text),
            });
            let record = cost.update_cost(
                client.name(),
                &client.config().model,
                usage.input_tokens,
                usage.output_tokens,
            );
            tracing::debug!(provider = %record.provider, model = %record.model, cost = record.cost, "actual cost");
        }
    }
}

fn failure_text(err: AppError) -> String {
    match err {
        AppError::LLM(message) => message,
        other => other.to_string(),
    }
}

/// Concatenate a [`StreamEvent`] stream into the final text.
///
/// Deltas from an abandoned attempt are dropped at each
/// [`StreamEvent::Failover`], so the result only holds the successful
/// provider's output.
pub async fn collect_stream_text<S>(events: S) -> Result<String>
where
    S: Stream<Item = StreamEvent>,
{
    let mut events = std::pin::pin!(events);
    let mut text = String::new();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Delta { text: delta, .. } => text.push_str(&delta),
            StreamEvent::Failover { .. } => text.clear(),
            StreamEvent::Done { .. } => return Ok(text),
            StreamEvent::Error { provider, message } => {
                return Err(match provider {
                    Some(provider) => AppError::classify_provider_failure(&provider, message),
                    None => AppError::ProviderUnavailable(message),
                });
            }
        }
    }
    Ok(text)
}
