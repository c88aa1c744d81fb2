//! In-process collections. Contents live as long as the store value.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use lexdb_core::error::{Error, Result};
use lexdb_core::traits::{check_dimensions, CollectionStore};
use lexdb_core::types::{BackendKind, Collection, Entry, Metric, QueryHit};

use crate::similarity::{rank, score};

struct MemoryCollection {
    info: Collection,
    /// Insertion order; an overwritten id keeps its slot.
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl MemoryCollection {
    fn upsert(&mut self, entry: Entry) {
        match self.positions.get(&entry.id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

pub struct EphemeralStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    dim: usize,
    metric: Metric,
    batch_size: usize,
}

impl EphemeralStore {
    pub fn new(dim: usize, metric: Metric, batch_size: usize) -> Self {
        Self { collections: RwLock::new(HashMap::new()), dim, metric, batch_size: batch_size.max(1) }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections.read().map_err(|_| Error::Storage("collection lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections.write().map_err(|_| Error::Storage("collection lock poisoned".into()))
    }
}

#[async_trait]
impl CollectionStore for EphemeralStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Ephemeral
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn get_or_create(&self, name: &str) -> Result<Collection> {
        let mut map = self.write()?;
        let col = map.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(collection = name, dim = self.dim, metric = %self.metric, "creating in-memory collection");
            MemoryCollection {
                info: Collection { name: name.to_string(), dim: self.dim, metric: self.metric },
                entries: Vec::new(),
                positions: HashMap::new(),
            }
        });
        Ok(col.info.clone())
    }

    async fn open(&self, name: &str) -> Result<Collection> {
        self.read()?
            .get(name)
            .map(|c| c.info.clone())
            .ok_or_else(|| Error::NotIndexed(name.to_string()))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn count(&self, collection: &Collection) -> Result<usize> {
        self.read()?
            .get(&collection.name)
            .map(|c| c.entries.len())
            .ok_or_else(|| Error::NotIndexed(collection.name.clone()))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn upsert_batch(&self, collection: &Collection, batch: &[Entry]) -> Result<()> {
        check_dimensions(collection, batch)?;
        let mut map = self.write()?;
        let col = map.get_mut(&collection.name).ok_or_else(|| Error::NotIndexed(collection.name.clone()))?;
        for entry in batch {
            col.upsert(entry.clone());
        }
        Ok(())
    }

    async fn search(&self, collection: &Collection, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let map = self.read()?;
        let Some(col) = map.get(&collection.name) else {
            return Err(Error::NotIndexed(collection.name.clone()));
        };
        let metric = col.info.metric;
        let scored = col
            .entries
            .iter()
            .zip(0i64..)
            .map(|(e, seq)| {
                let hit = QueryHit {
                    id: e.id.clone(),
                    document: e.document.clone(),
                    metadata: e.metadata.clone(),
                    score: score(metric, query, &e.vector),
                };
                (hit, seq)
            })
            .collect();
        Ok(rank(scored, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexdb_core::types::ChunkMetadata;

    fn entry(id: &str, vector: Vec<f32>) -> Entry {
        Entry {
            id: id.into(),
            vector,
            document: format!("doc {id}"),
            metadata: ChunkMetadata {
                source: "ipc.csv".into(),
                act_title: "IPC".into(),
                section_name: "Theft".into(),
                section_number: "378".into(),
            },
        }
    }

    #[tokio::test]
    async fn get_or_create_keeps_entries() {
        let store = EphemeralStore::new(2, Metric::Cosine, 10);
        let col = store.get_or_create("acts").await.unwrap();
        store.add(&col, &[entry("a", vec![1.0, 0.0])]).await.unwrap();
        let again = store.get_or_create("acts").await.unwrap();
        assert_eq!(store.count(&again).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn overwrite_keeps_insertion_slot() {
        let store = EphemeralStore::new(2, Metric::Cosine, 10);
        let col = store.get_or_create("acts").await.unwrap();
        store.add(&col, &[entry("a", vec![1.0, 0.0]), entry("b", vec![1.0, 0.0])]).await.unwrap();
        store.add(&col, &[entry("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.count(&col).await.unwrap(), 2);
        let res = store.query(&col, &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = res.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn small_batches_all_land() {
        let store = EphemeralStore::new(1, Metric::L2, 3);
        let col = store.get_or_create("acts").await.unwrap();
        let entries: Vec<_> = (0..10).map(|i| entry(&format!("e{i}"), vec![i as f32])).collect();
        assert_eq!(store.add(&col, &entries).await.unwrap(), 10);
        assert_eq!(store.count(&col).await.unwrap(), 10);
        let res = store.query(&col, &[4.2], 1).await.unwrap();
        assert_eq!(res.hits[0].id, "e4");
    }
}
