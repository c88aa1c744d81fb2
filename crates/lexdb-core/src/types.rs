//! Domain types used by the indexer, the collection store and the query engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Section number recorded when a source row carries none.
pub const NO_SECTION_NUMBER: &str = "N/A";

/// One structured row of an ingestion file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub section_name: String,
    pub section_number: String,
    pub section_text: String,
}

/// Metadata stored next to every chunk in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name the row was read from.
    pub source: String,
    pub act_title: String,
    pub section_name: String,
    pub section_number: String,
}

/// A span of a section's text that is independently embedded and retrieved.
///
/// - `id`: `{source}_{row_index}_{sequence_index}`, stable across runs
/// - `row_index`: zero-based data row within the source file
/// - `sequence_index`: position of the chunk within its section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub text: String,
    pub row_index: usize,
    pub sequence_index: usize,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn make_id(source_file: &str, row_index: usize, sequence_index: usize) -> ChunkId {
        format!("{source_file}_{row_index}_{sequence_index}")
    }
}

/// Similarity metric, fixed per collection at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "l2" | "euclidean" => Ok(Metric::L2),
            other => Err(Error::InvalidConfig(format!("unknown metric '{other}'"))),
        }
    }
}

/// Which storage backend holds the collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ephemeral,
    Persistent,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Ephemeral => "ephemeral",
            BackendKind::Persistent => "persistent",
        }
    }
}

/// Handle to a named collection. Cheap to clone; holds no entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub dim: usize,
    pub metric: Metric,
}

/// One `(id, vector, document, metadata)` tuple submitted to a store.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

impl Entry {
    pub fn from_chunk(chunk: DocumentChunk, vector: Vec<f32>) -> Self {
        Self { id: chunk.id, vector, document: chunk.text, metadata: chunk.metadata }
    }
}

/// A retrieved entry. `score` is metric-specific but higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: ChunkId,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Hits ordered by decreasing score, at most `top_k` long.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub hits: Vec<QueryHit>,
}

impl QueryResult {
    pub fn new(hits: Vec<QueryHit>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryHit> {
        self.hits.iter()
    }
}

impl IntoIterator for QueryResult {
    type Item = QueryHit;
    type IntoIter = std::vec::IntoIter<QueryHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(DocumentChunk::make_id("ipc.csv", 4, 2), "ipc.csv_4_2");
        assert_eq!(DocumentChunk::make_id("ipc.csv", 4, 2), DocumentChunk::make_id("ipc.csv", 4, 2));
    }

    #[test]
    fn metric_parses_aliases() {
        assert_eq!("Cosine".parse::<Metric>().expect("metric"), Metric::Cosine);
        assert_eq!("euclidean".parse::<Metric>().expect("metric"), Metric::L2);
        assert!("dot".parse::<Metric>().is_err());
    }
}
