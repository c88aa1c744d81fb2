//! Text embedding: model implementations plus the [`Embedder`] that drives
//! them with bounded concurrency and retries.

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;

use lexdb_core::config::{expand_path, AppConfig, EmbeddingConfig, EmbeddingProvider, RetryConfig};
use lexdb_core::error::Error;
use lexdb_core::retry::RetryPolicy;
use lexdb_core::traits::EmbeddingModel;

pub mod device;
pub mod fake;
pub mod local;
pub mod pool;
pub mod remote;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use local::LocalBertEmbedder;
pub use pool::masked_mean_l2;
pub use remote::{OllamaEmbedder, OpenAiEmbedder};

/// Drives an [`EmbeddingModel`] for the indexer and the query engine.
///
/// In `embed` and `embed_one` an item whose remote call still fails after the
/// retry policy is replaced by a zero vector and logged. A vector of the wrong
/// dimension is a model/config mismatch and is returned as
/// `Error::DimensionMismatch`. `try_embed_one` surfaces every error.
#[derive(Clone)]
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    retry: RetryPolicy,
    workers: usize,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>, retry: RetryPolicy, workers: usize) -> Self {
        Self { model, retry, workers: workers.max(1) }
    }

    /// Deterministic in-process embedder for tests and offline runs.
    pub fn fake(dim: usize) -> Self {
        Self::new(Arc::new(FakeEmbedder::new(dim)), RetryPolicy::none(), 4)
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let model = build_model(&cfg.embedding, &cfg.retry)?;
        Ok(Self::new(model, RetryPolicy::from(&cfg.retry), cfg.embedding.workers))
    }

    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub async fn try_embed_one(&self, text: &str) -> lexdb_core::Result<Vec<f32>> {
        let vector = self
            .retry
            .run(self.model.model_id(), || self.model.embed(text))
            .await
            .map_err(|e| Error::RemoteService(format!("{}: {e:#}", self.model.model_id())))?;
        if vector.len() != self.dim() {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: vector.len() });
        }
        Ok(vector)
    }

    pub async fn embed_one(&self, text: &str) -> lexdb_core::Result<Vec<f32>> {
        match self.try_embed_one(text).await {
            Err(Error::RemoteService(msg)) => {
                tracing::warn!(model = %self.model_id(), error = %msg, "embedding failed; using zero vector");
                Ok(vec![0.0; self.dim()])
            }
            other => other,
        }
    }

    /// Embed `texts` in order with at most `workers` calls in flight.
    /// Stops at the first dimension mismatch.
    pub async fn embed(&self, texts: &[String]) -> lexdb_core::Result<Vec<Vec<f32>>> {
        stream::iter(texts.iter().map(|t| self.embed_one(t)))
            .buffered(self.workers)
            .try_collect()
            .await
    }
}

/// Construct the configured embedding model.
pub fn build_model(cfg: &EmbeddingConfig, retry: &RetryConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let timeout = (retry.timeout_secs > 0).then(|| Duration::from_secs(retry.timeout_secs));
    let model: Arc<dyn EmbeddingModel> = match cfg.provider {
        EmbeddingProvider::Fake => Arc::new(FakeEmbedder::new(cfg.dim)),
        EmbeddingProvider::Local => {
            let dir = cfg
                .model_dir
                .as_deref()
                .ok_or_else(|| anyhow!("embedding.model_dir is required for the local provider"))?;
            Arc::new(LocalBertEmbedder::load(&expand_path(dir))?)
        }
        EmbeddingProvider::Ollama => {
            Arc::new(OllamaEmbedder::new(remote::http_client(timeout)?, &cfg.base_url, &cfg.model, cfg.dim))
        }
        EmbeddingProvider::OpenAi => {
            let key_var = cfg.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let key = std::env::var(key_var).map_err(|_| anyhow!("{key_var} is not set"))?;
            Arc::new(OpenAiEmbedder::new(remote::http_client(timeout)?, &cfg.base_url, &cfg.model, cfg.dim, Some(key)))
        }
    };
    tracing::info!(model = %model.model_id(), dim = model.dim(), "embedding model configured");
    Ok(model)
}
