//! Retrieval-augmented question answering over legal acts.
//!
//! [`LegalRag`] wires the configured embedder, collection store and
//! generation service together and exposes indexing, answering and
//! whole-act browsing.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use lexdb_core::browser::{FullDocument, MetadataBrowser};
use lexdb_core::chunker::Chunker;
use lexdb_core::config::{expand_path, AppConfig};
use lexdb_core::data_processor::DataProcessor;
use lexdb_core::error::Result;
use lexdb_core::traits::{CollectionStore, Generator};
use lexdb_core::types::{BackendKind, Metric, QueryResult};
use lexdb_embed::Embedder;

pub mod generate;
pub mod indexer;
pub mod prompt;
pub mod query;

pub use generate::{build_generator, ChatCompletionsGenerator, RetryingGenerator};
pub use indexer::{IndexReport, Indexer};
pub use query::{Answer, AnswerStatus, QueryEngine};

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub backend: BackendKind,
    pub metric: Metric,
    pub dim: usize,
    pub entries: usize,
    pub embedding_model: String,
}

pub struct LegalRag {
    config: AppConfig,
    embedder: Embedder,
    store: Arc<dyn CollectionStore>,
    indexer: Indexer,
    engine: QueryEngine,
    browser: MetadataBrowser,
}

impl LegalRag {
    /// Build every collaborator from configuration.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let embedder = Embedder::from_config(&config)?;
        let store = lexdb_vector::open_store(&config.store, embedder.dim()).await?;
        let generator = build_generator(&config)?;
        Ok(Self::from_parts(config, embedder, store, generator)?)
    }

    /// Assemble from already constructed collaborators.
    pub fn from_parts(
        config: AppConfig,
        embedder: Embedder,
        store: Arc<dyn CollectionStore>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.size, config.chunking.overlap)?;
        let indexer = Indexer::new(
            DataProcessor::new(chunker).with_plain_text(config.data.plain_text),
            embedder.clone(),
            Arc::clone(&store),
        )
        .with_progress(config.indexing.progress);
        let engine = QueryEngine::new(embedder.clone(), Arc::clone(&store), config.data.collection.clone())
            .with_generator(generator)
            .with_system_prompt(config.generation.system_prompt.clone())
            .with_max_chunk_chars(config.query.max_chunk_chars);
        let browser =
            MetadataBrowser::new(expand_path(&config.data.metadata_folder)).with_plain_text(config.data.plain_text);
        Ok(Self { config, embedder, store, indexer, engine, browser })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn build_index(&self, folder: &Path, collection: &str) -> Result<IndexReport> {
        self.indexer.build_index(folder, collection).await
    }

    pub async fn answer(&self, query: &str, top_k: usize) -> Result<Answer> {
        self.engine.answer(query, top_k).await
    }

    /// Raw top-k retrieval without generation.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<QueryResult> {
        self.engine.retrieve(query, top_k).await
    }

    pub fn load_full_document(&self, title: &str) -> Result<Option<FullDocument>> {
        self.browser.load_full_document(title)
    }

    pub fn list_titles(&self) -> Result<Vec<String>> {
        self.browser.list_titles()
    }

    pub async fn stats(&self) -> Result<CollectionStats> {
        let collection = self.store.open(self.engine.collection()).await?;
        let entries = self.store.count(&collection).await?;
        Ok(CollectionStats {
            name: collection.name,
            backend: self.store.backend(),
            metric: collection.metric,
            dim: collection.dim,
            entries,
            embedding_model: self.embedder.model_id().to_string(),
        })
    }

    /// Drop the configured collection. Returns false if it did not exist.
    pub async fn reset(&self) -> Result<bool> {
        self.store.delete_collection(self.engine.collection()).await
    }
}
