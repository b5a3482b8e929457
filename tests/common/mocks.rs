//! Mock implementations for testing.
//!
//! Scripted provider clients shared across the integration tests. Each
//! client answers from a queue of scripted outcomes and falls back to a
//! fixed default once the queue is empty.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use labrelay::llm::{Completion, GenerateRequest, ProviderClient, ProviderConfig, ProviderKind, TextStream, TokenUsage};
use labrelay::types::{AppError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted streaming call.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// `stream()` itself fails before any chunk
    Refuse(String),
    /// Chunks in order; an `Err` ends the stream with that failure
    Chunks(Vec<std::result::Result<String, String>>),
}

impl StreamScript {
    pub fn ok(chunks: &[&str]) -> Self {
        StreamScript::Chunks(chunks.iter().map(|c| Ok(c.to_string())).collect())
    }

    /// Emit `chunks`, then fail with `error`.
    pub fn broken(chunks: &[&str], error: &str) -> Self {
        let mut items: Vec<_> = chunks.iter().map(|c| Ok(c.to_string())).collect();
        items.push(Err(error.to_string()));
        StreamScript::Chunks(items)
    }
}

/// Mock provider client with scripted responses and call counters.
pub struct ScriptedClient {
    config: ProviderConfig,
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_reply: std::result::Result<String, String>,
    streams: Mutex<VecDeque<StreamScript>>,
    usage: Option<TokenUsage>,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedClient {
    fn build(name: &str, default_reply: std::result::Result<String, String>) -> Self {
        Self {
            config: ProviderConfig::new(name, ProviderKind::OpenAI, format!("{}-model", name)),
            replies: Mutex::new(VecDeque::new()),
            default_reply,
            streams: Mutex::new(VecDeque::new()),
            usage: None,
            calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// A client that always answers `text`.
    pub fn replying(name: &str, text: &str) -> Self {
        Self::build(name, Ok(text.to_string()))
    }

    /// A client whose every call fails with `error`.
    pub fn failing(name: &str, error: &str) -> Self {
        Self::build(name, Err(error.to_string()))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    /// Report fixed usage on every successful `generate`.
    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
        });
        self
    }

    /// Queue a failure for the next unscripted `generate`.
    pub fn then_fail(self, error: &str) -> Self {
        self.replies.lock().push_back(Err(error.to_string()));
        self
    }

    /// Queue a reply for the next unscripted `generate`.
    pub fn then_reply(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    /// Queue a script for the next `stream` call.
    pub fn then_stream(self, script: StreamScript) -> Self {
        self.streams.lock().push_back(script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn next_reply(&self) -> std::result::Result<String, String> {
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_reply() {
            Ok(text) => Ok(Completion {
                text,
                usage: self.usage,
            }),
            Err(e) => Err(AppError::LLM(e)),
        }
    }

    async fn stream(&self, _request: &GenerateRequest) -> Result<TextStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.streams.lock().pop_front();
        let script = match script {
            Some(script) => script,
            None => match &self.default_reply {
                Ok(text) => StreamScript::Chunks(vec![Ok(text.clone())]),
                Err(e) => StreamScript::Refuse(e.clone()),
            },
        };

        match script {
            StreamScript::Refuse(e) => Err(AppError::LLM(e)),
            StreamScript::Chunks(items) => Ok(stream::iter(
                items.into_iter().map(|item| item.map_err(AppError::LLM)),
            )
            .boxed()),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.default_reply {
            Ok(_) => Ok(vec![text.len() as f32, 1.0]),
            Err(e) => Err(AppError::LLM(e.clone())),
        }
    }
}
