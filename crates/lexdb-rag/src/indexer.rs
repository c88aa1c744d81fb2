use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use lexdb_core::data_processor::DataProcessor;
use lexdb_core::error::Result;
use lexdb_core::traits::CollectionStore;
use lexdb_core::types::Entry;
use lexdb_embed::Embedder;

/// Totals of one `build_index` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub rows_rejected: usize,
    pub chunks_indexed: usize,
}

pub struct Indexer {
    processor: DataProcessor,
    embedder: Embedder,
    store: Arc<dyn CollectionStore>,
    progress: bool,
}

impl Indexer {
    pub fn new(processor: DataProcessor, embedder: Embedder, store: Arc<dyn CollectionStore>) -> Self {
        Self { processor, embedder, store, progress: false }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Chunk, embed and upsert every source file directly under `folder`.
    ///
    /// Files missing required columns, or that cannot be parsed, are skipped
    /// with a warning. Storage failures and dimension mismatches, whether from
    /// the embedding model or the stored collection, abort the run.
    pub async fn build_index(&self, folder: &Path, collection_name: &str) -> Result<IndexReport> {
        let files = self.processor.list_files(folder)?;
        let collection = self.store.get_or_create(collection_name).await?;
        tracing::info!(folder = %folder.display(), files = files.len(), collection = collection_name, "indexing");

        let pb = self.progress_bar(files.len());
        let mut report = IndexReport::default();
        for path in &files {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            pb.set_message(name.clone());

            let file = match self.processor.load_file(path) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping file");
                    report.files_skipped += 1;
                    pb.inc(1);
                    continue;
                }
            };
            let out = self.processor.chunk_file(&file);
            report.rows_rejected += out.rows_rejected;

            let texts: Vec<String> = out.chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            let entries: Vec<Entry> =
                out.chunks.into_iter().zip(vectors).map(|(chunk, v)| Entry::from_chunk(chunk, v)).collect();
            let written = self.store.add(&collection, &entries).await?;

            report.chunks_indexed += written;
            report.files_indexed += 1;
            tracing::debug!(file = %name, chunks = written, "indexed file");
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::info!(
            collection = collection_name,
            chunks = report.chunks_indexed,
            files = report.files_indexed,
            skipped = report.files_skipped,
            rejected_rows = report.rows_rejected,
            "indexing complete"
        );
        Ok(report)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}
