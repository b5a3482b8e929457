//! Anthropic Claude client
//!
//! Talks to the Messages API (`POST /v1/messages`) directly over HTTP,
//! including its server-sent event stream.

use crate::llm::client::{
    Completion, GenerateRequest, ProviderClient, ProviderConfig, TextStream, TokenUsage,
    status_error, transport_error,
};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude client for API-based inference
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// The subset of stream events that carry text or failures.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: StreamDelta,
    },
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    fn build_body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens_or(&self.config),
            "temperature": request.temperature_or(&self.config),
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": stream,
        });
        // Claude takes the system prompt outside the message list
        if let Some(system) = request.system_prompt_or(&self.config) {
            body["system"] = Value::String(system.to_string());
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&self.config.name, e))?;

        if !response.status().is_success() {
            return Err(status_error(&self.config.name, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Completion> {
        let response = self.send(&self.build_body(request, false)).await?;
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("{} returned an invalid response: {}", self.config.name, e)))?;

        let blocks: Vec<String> = body
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();
        if blocks.is_empty() {
            return Err(AppError::LLM(format!("No response from {}", self.config.name)));
        }

        Ok(Completion {
            text: blocks.concat(),
            usage: body.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let response = self.send(&self.build_body(request, true)).await?;
        let provider = self.config.name.clone();

        let stream = response.bytes_stream().eventsource().filter_map(move |event| {
            let provider = provider.clone();
            async move {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        return Some(Err(AppError::LLM(format!(
                            "{} stream interrupted: {}",
                            provider, e
                        ))));
                    }
                };
                match serde_json::from_str::<StreamEvent>(&event.data) {
                    Ok(StreamEvent::ContentBlockDelta { delta }) => {
                        delta.text.filter(|t| !t.is_empty()).map(Ok)
                    }
                    Ok(StreamEvent::Error { error }) => Some(Err(AppError::LLM(format!(
                        "{} API error: {}",
                        provider, error.message
                    )))),
                    Ok(StreamEvent::Other) => None,
                    Err(e) => {
                        tracing::warn!(provider = %provider, event = %event.event, error = %e, "skipping unparseable stream event");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::LLM(format!(
            "{} does not support embeddings",
            self.config.name
        )))
    }
}
