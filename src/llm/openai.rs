//! OpenAI-compatible chat completions client
//!
//! Speaks the `/chat/completions` and `/embeddings` endpoints, which covers
//! OpenAI itself, xAI (`https://api.x.ai/v1`) and Ollama's `/v1` layer.

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

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiCompatibleClient {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn chat_body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt_or(&self.config) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature_or(&self.config),
            "max_tokens": request.max_tokens_or(&self.config),
            "stream": stream,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let mut builder = self.http.post(self.endpoint(path)).json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
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
impl ProviderClient for OpenAiCompatibleClient {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Completion> {
        let response = self
            .post("chat/completions", &self.chat_body(request, false))
            .await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("{} returned an invalid response: {}", self.config.name, e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLM(format!("No response from {}", self.config.name)))?;

        Ok(Completion {
            text,
            usage: body.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let response = self
            .post("chat/completions", &self.chat_body(request, true))
            .await?;
        let provider = self.config.name.clone();

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(event) if event.data.trim() == "[DONE]");
                futures::future::ready(!done)
            })
            .filter_map(move |event| {
                let provider = provider.clone();
                async move {
                    match event {
                        Ok(event) => match serde_json::from_str::<ChatChunk>(&event.data) {
                            Ok(chunk) => chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content)
                                .filter(|text| !text.is_empty())
                                .map(Ok),
                            Err(e) => {
                                tracing::warn!(provider = %provider, error = %e, "skipping unparseable stream chunk");
                                None
                            }
                        },
                        Err(e) => Some(Err(AppError::LLM(format!(
                            "{} stream interrupted: {}",
                            provider, e
                        )))),
                    }
                }
            });

        Ok(stream.boxed())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self
            .config
            .embedding_model
            .as_deref()
            .unwrap_or(&self.config.model);
        let response = self
            .post("embeddings", &json!({"model": model, "input": text}))
            .await?;
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("{} returned an invalid embedding: {}", self.config.name, e)))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::LLM(format!("No embedding from {}", self.config.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ProviderKind;

    fn client() -> OpenAiCompatibleClient {
        let mut config = ProviderConfig::new("xai", ProviderKind::OpenAI, "grok-2")
            .with_api_base("https://api.x.ai/v1/");
        config.system_prompt = Some("You are a reviewer.".to_string());
        OpenAiCompatibleClient::new("key".to_string(), config).unwrap()
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        assert_eq!(client().endpoint("chat/completions"), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn test_chat_body_includes_system_and_overrides() {
        let request = GenerateRequest::new("Summarize this").with_max_tokens(64);
        let body = client().chat_body(&request, true);

        assert_eq!(body["model"], "grok-2");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Summarize this");
    }
}
