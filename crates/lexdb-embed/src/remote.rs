//! Embedding services reached over HTTP.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lexdb_core::traits::EmbeddingModel;

pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// `{base}/v1/{path}` unless `base` already ends in a version segment or in `path`.
pub fn versioned_endpoint(base_url: &str, path: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with(&format!("/{path}")) {
        return normalized;
    }
    if has_version_suffix(&normalized) {
        return format!("{normalized}/{path}");
    }
    format!("{normalized}/v1/{path}")
}

/// Shared client with a request timeout.
pub fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder.build().map_err(|e| anyhow!("building HTTP client: {e}"))
}

/// Ollama's native `POST /api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dim: usize,
    id: String,
}

impl OllamaEmbedder {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, dim: usize) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/embeddings", normalize_base_url(base_url)),
            model: model.to_string(),
            dim,
            id: format!("ollama:{model}"),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&OllamaRequest { model: &self.model, prompt: text })
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaResponse>()
            .await?;
        Ok(resp.embedding)
    }
}

/// OpenAI-compatible `POST /v1/embeddings`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, dim: usize, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: versioned_endpoint(base_url, "embeddings"),
            api_key,
            model: model.to_string(),
            dim,
            id: format!("openai:{model}"),
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiData>,
}

#[derive(Deserialize)]
struct OpenAiData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut req = self.client.post(&self.endpoint).json(&OpenAiRequest { model: &self.model, input: [text] });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?.error_for_status()?.json::<OpenAiResponse>().await?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("empty embedding response"))
    }
}
