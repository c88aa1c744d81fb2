use serde::Serialize;
use std::sync::Arc;

use lexdb_core::error::Result;
use lexdb_core::traits::{CollectionStore, Generator};
use lexdb_core::types::{QueryHit, QueryResult};
use lexdb_embed::Embedder;

use crate::prompt::{build_context, build_prompt, excerpts_answer, unavailable_answer, NO_RELEVANT_CONTENT};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a legal expert on Indian laws.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Generated,
    NoRelevantContent,
    GenerationUnavailable,
    ExcerptsOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub status: AnswerStatus,
    /// Context block given to the generator; empty when nothing was retrieved.
    pub context: String,
    pub hits: Vec<QueryHit>,
}

pub struct QueryEngine {
    embedder: Embedder,
    store: Arc<dyn CollectionStore>,
    generator: Option<Arc<dyn Generator>>,
    collection: String,
    system_prompt: String,
    max_chunk_chars: usize,
}

impl QueryEngine {
    pub fn new(embedder: Embedder, store: Arc<dyn CollectionStore>, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            store,
            generator: None,
            collection: collection.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_chunk_chars: 1000,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Option<Arc<dyn Generator>>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_max_chunk_chars(mut self, max: usize) -> Self {
        self.max_chunk_chars = max;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Top-k chunks for `query`. `Error::NotIndexed` if the collection was never built.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<QueryResult> {
        let collection = self.store.open(&self.collection).await?;
        let vector = self.embedder.embed_one(query).await?;
        self.store.query(&collection, &vector, top_k).await
    }

    pub async fn answer(&self, query: &str, top_k: usize) -> Result<Answer> {
        let result = self.retrieve(query, top_k).await?;
        if result.is_empty() {
            tracing::info!(query, "no relevant content");
            return Ok(Answer {
                text: NO_RELEVANT_CONTENT.to_string(),
                status: AnswerStatus::NoRelevantContent,
                context: String::new(),
                hits: Vec::new(),
            });
        }

        let context = build_context(&result.hits, self.max_chunk_chars);
        let Some(generator) = &self.generator else {
            return Ok(Answer {
                text: excerpts_answer(&context),
                status: AnswerStatus::ExcerptsOnly,
                context,
                hits: result.hits,
            });
        };

        let prompt = build_prompt(&context, query);
        let (text, status) = match generator.generate(&self.system_prompt, &prompt).await {
            Ok(text) => (text, AnswerStatus::Generated),
            Err(e) => {
                tracing::warn!(generator = %generator.name(), error = %e, "generation failed");
                (unavailable_answer(&context), AnswerStatus::GenerationUnavailable)
            }
        };
        Ok(Answer { text, status, context, hits: result.hits })
    }
}
