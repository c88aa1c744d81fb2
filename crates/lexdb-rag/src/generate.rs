//! Text-completion services behind the [`Generator`] seam.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use lexdb_core::config::{AppConfig, GenerationProvider};
use lexdb_core::error::Error;
use lexdb_core::retry::RetryPolicy;
use lexdb_core::traits::Generator;
use lexdb_embed::remote::{http_client, versioned_endpoint};

/// Any OpenAI-compatible `/chat/completions` endpoint (Groq, Together, LM Studio, Ollama).
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatCompletionsGenerator {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: versioned_endpoint(base_url, "chat/completions"),
            model: model.to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion failed ({status}): {text}"));
        }
        let payload: ChatResponse = res.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }
}

/// Retries the wrapped generator; the final failure surfaces as `Error::RemoteService`.
pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        self.policy
            .run(self.inner.name(), || self.inner.generate(system, prompt))
            .await
            .map_err(|e| Error::RemoteService(format!("{}: {e:#}", self.inner.name())).into())
    }
}

/// The configured generator wrapped in the retry policy; `None` for excerpt-only answers.
pub fn build_generator(cfg: &AppConfig) -> Result<Option<Arc<dyn Generator>>> {
    let gen = &cfg.generation;
    match gen.provider {
        GenerationProvider::None => Ok(None),
        GenerationProvider::Chat => {
            let api_key = match gen.api_key_env.as_deref() {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    anyhow!("{var} is not set; export it or set generation.provider = \"none\"")
                })?),
                None => None,
            };
            let timeout = (cfg.retry.timeout_secs > 0).then(|| Duration::from_secs(cfg.retry.timeout_secs));
            let chat = ChatCompletionsGenerator::new(http_client(timeout)?, &gen.base_url, &gen.model)
                .with_api_key(api_key)
                .with_temperature(gen.temperature)
                .with_max_tokens(gen.max_tokens);
            tracing::info!(endpoint = %chat.endpoint(), model = %gen.model, "generation service configured");
            Ok(Some(Arc::new(RetryingGenerator::new(Arc::new(chat), RetryPolicy::from(&cfg.retry)))))
        }
    }
}
