use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{BackendKind, Collection, Entry, QueryHit, QueryResult};

/// A model mapping text to a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `ollama:nomic-embed-text`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// A text-completion service: one prompt in, one completion out.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Named containers of `(id, vector, document, metadata)` entries.
///
/// Backends implement the primitive operations; batching, dimension checks
/// and `top_k` clamping live in the provided `add` and `query`.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Upper bound on entries written per atomic batch.
    fn batch_size(&self) -> usize;

    /// Load the collection if it exists, create it otherwise. Never drops data.
    async fn get_or_create(&self, name: &str) -> Result<Collection>;

    /// Load an existing collection; `Error::NotIndexed` if absent.
    async fn open(&self, name: &str) -> Result<Collection>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// `Error::NotIndexed` if the collection no longer exists, as do
    /// `upsert_batch` and `search`.
    async fn count(&self, collection: &Collection) -> Result<usize>;

    /// Drop a collection and all its entries. Returns false if it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Insert or overwrite one batch by id, all or nothing.
    async fn upsert_batch(&self, collection: &Collection, batch: &[Entry]) -> Result<()>;

    /// Exact nearest neighbours; `k` is already clamped to `1..=count`.
    async fn search(&self, collection: &Collection, query: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    /// Upsert `entries` in batches of `batch_size`. Dimensions are checked for
    /// every entry before anything is written. A failing batch stops the call;
    /// batches before it stay committed.
    async fn add(&self, collection: &Collection, entries: &[Entry]) -> Result<usize> {
        check_dimensions(collection, entries)?;
        let mut written = 0usize;
        for batch in entries.chunks(self.batch_size().max(1)) {
            self.upsert_batch(collection, batch).await?;
            written += batch.len();
            tracing::debug!(collection = %collection.name, batch = batch.len(), written, "committed batch");
        }
        Ok(written)
    }

    /// Top-k retrieval ordered by decreasing score.
    ///
    /// An all-zero query vector (a degraded embedding) retrieves nothing.
    async fn query(&self, collection: &Collection, query: &[f32], top_k: usize) -> Result<QueryResult> {
        if query.len() != collection.dim {
            return Err(Error::DimensionMismatch { expected: collection.dim, actual: query.len() });
        }
        let count = self.count(collection).await?;
        if top_k == 0 || is_zero_vector(query) {
            return Ok(QueryResult::default());
        }
        let k = top_k.min(count);
        if k == 0 {
            return Ok(QueryResult::default());
        }
        let hits = self.search(collection, query, k).await?;
        Ok(QueryResult::new(hits))
    }
}

pub fn check_dimensions(collection: &Collection, entries: &[Entry]) -> Result<()> {
    match entries.iter().find(|e| e.vector.len() != collection.dim) {
        Some(bad) => Err(Error::DimensionMismatch { expected: collection.dim, actual: bad.vector.len() }),
        None => Ok(()),
    }
}

pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}
