//! Persistent collections, one LanceDB table each, under a single directory.

use async_trait::async_trait;
use lancedb::{Connection, Table};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

use lexdb_core::error::{Error, Result};
use lexdb_core::traits::{check_dimensions, CollectionStore};
use lexdb_core::types::{BackendKind, Collection, Entry, Metric, QueryHit};

use crate::schema::{build_collection_schema, vector_dim};
use crate::search::nearest;
use crate::table::{
    ensure_table, forget_collection, lookup_collection, open_db, record_collection, table_exists,
    validate_collection_name,
};
use crate::writer::{entries_to_record_batch, existing_seqs, max_seq, merge_batch};

pub struct LanceStore {
    conn: Connection,
    dim: usize,
    metric: Metric,
    batch_size: usize,
    /// Next free sequence number per collection, loaded on first write.
    next_seq: Mutex<HashMap<String, i64>>,
}

impl LanceStore {
    pub async fn open(path: &Path, dim: usize, metric: Metric, batch_size: usize) -> Result<Self> {
        let conn = open_db(path).await?;
        tracing::info!(path = %path.display(), "opened LanceDB store");
        Ok(Self {
            conn,
            dim,
            metric,
            batch_size: batch_size.max(1),
            next_seq: Mutex::new(HashMap::new()),
        })
    }

    /// `Error::NotIndexed` if the table was never created or has been dropped.
    async fn table(&self, name: &str) -> Result<Table> {
        if !table_exists(&self.conn, name).await? {
            return Err(Error::NotIndexed(name.to_string()));
        }
        self.conn.open_table(name).execute().await.map_err(Error::storage)
    }

    /// Handle for an existing table, checking its dimension against the embedder's.
    async fn load(&self, name: &str) -> Result<Collection> {
        let table = self.table(name).await?;
        let schema = table.schema().await.map_err(Error::storage)?;
        let dim = vector_dim(&schema).ok_or_else(|| Error::Storage(format!("{name} has no vector column")))?;
        if dim != self.dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: self.dim });
        }
        let metric = match lookup_collection(&self.conn, name).await? {
            Some((_, recorded)) if recorded != dim => {
                return Err(Error::Storage(format!(
                    "catalog records dimension {recorded} for {name} but its table stores {dim}"
                )));
            }
            Some((metric, _)) => metric,
            None => {
                tracing::warn!(
                    collection = name,
                    metric = %self.metric,
                    "collection missing from catalog; assuming configured metric"
                );
                self.metric
            }
        };
        Ok(Collection { name: name.to_string(), dim, metric })
    }
}

#[async_trait]
impl CollectionStore for LanceStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Persistent
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn get_or_create(&self, name: &str) -> Result<Collection> {
        validate_collection_name(name)?;
        if table_exists(&self.conn, name).await? {
            return self.load(name).await;
        }
        tracing::info!(collection = name, dim = self.dim, metric = %self.metric, "creating collection table");
        ensure_table(&self.conn, name, build_collection_schema(self.dim)).await?;
        record_collection(&self.conn, name, self.metric, self.dim).await?;
        Ok(Collection { name: name.to_string(), dim: self.dim, metric: self.metric })
    }

    async fn open(&self, name: &str) -> Result<Collection> {
        validate_collection_name(name)?;
        self.load(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        if validate_collection_name(name).is_err() {
            return Ok(false);
        }
        table_exists(&self.conn, name).await
    }

    async fn count(&self, collection: &Collection) -> Result<usize> {
        let table = self.table(&collection.name).await?;
        table.count_rows(None).await.map_err(Error::storage)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        if !table_exists(&self.conn, name).await? {
            return Ok(false);
        }
        self.conn.drop_table(name, &[]).await.map_err(Error::storage)?;
        forget_collection(&self.conn, name).await?;
        self.next_seq.lock().await.remove(name);
        tracing::info!(collection = name, "dropped collection table");
        Ok(true)
    }

    async fn upsert_batch(&self, collection: &Collection, batch: &[Entry]) -> Result<()> {
        check_dimensions(collection, batch)?;
        if batch.is_empty() {
            return Ok(());
        }
        let table = self.table(&collection.name).await?;
        let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
        let known = existing_seqs(&table, &ids).await?;

        let mut next_seq = self.next_seq.lock().await;
        let next = match next_seq.get(&collection.name) {
            Some(n) => *n,
            None => max_seq(&table).await? + 1,
        };
        let mut fresh = next;
        let mut assigned: HashMap<&str, i64> = HashMap::new();
        let seqs: Vec<i64> = batch
            .iter()
            .map(|e| {
                if let Some(seq) = known.get(&e.id).or_else(|| assigned.get(e.id.as_str())) {
                    return *seq;
                }
                let seq = fresh;
                fresh += 1;
                assigned.insert(e.id.as_str(), seq);
                seq
            })
            .collect();

        let (entries, seqs) = dedupe_last_wins(batch, &seqs);
        merge_batch(&table, entries_to_record_batch(&entries, &seqs, collection.dim)?).await?;
        next_seq.insert(collection.name.clone(), fresh);
        Ok(())
    }

    async fn search(&self, collection: &Collection, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let table = self.table(&collection.name).await?;
        nearest(&table, collection.metric, query, k).await
    }
}

/// A merge source must not carry the same id twice; keep the last occurrence.
fn dedupe_last_wins(batch: &[Entry], seqs: &[i64]) -> (Vec<Entry>, Vec<i64>) {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, e) in batch.iter().enumerate() {
        last.insert(e.id.as_str(), i);
    }
    batch
        .iter()
        .zip(seqs)
        .enumerate()
        .filter(|(i, (e, _))| last.get(e.id.as_str()) == Some(i))
        .map(|(_, (e, s))| (e.clone(), *s))
        .unzip()
}
