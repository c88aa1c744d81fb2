use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lexdb_core::config::StoreConfig;
use lexdb_core::error::{Error, Result};
use lexdb_core::traits::CollectionStore;
use lexdb_core::types::{BackendKind, ChunkMetadata, Collection, Entry, Metric, QueryHit};
use lexdb_vector::table::{open_db, record_collection};
use lexdb_vector::{open_store, EphemeralStore, LanceStore};

fn entry(id: &str, vector: Vec<f32>) -> Entry {
    Entry {
        id: id.to_string(),
        vector,
        document: format!("text of {id}"),
        metadata: ChunkMetadata {
            source: "ipc.csv".into(),
            act_title: "Indian Penal Code".into(),
            section_name: "Theft".into(),
            section_number: "378".into(),
        },
    }
}

async fn backends(dir: &tempfile::TempDir, batch_size: usize) -> Vec<Arc<dyn CollectionStore>> {
    let lance = LanceStore::open(dir.path(), 3, Metric::Cosine, batch_size).await.unwrap();
    vec![Arc::new(EphemeralStore::new(3, Metric::Cosine, batch_size)), Arc::new(lance)]
}

/// Delegates to a real backend but fails the `fail_at`-th batch (zero-based).
struct FailingBatch {
    inner: Arc<dyn CollectionStore>,
    fail_at: usize,
    batches: AtomicUsize,
}

#[async_trait]
impl CollectionStore for FailingBatch {
    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    async fn get_or_create(&self, name: &str) -> Result<Collection> {
        self.inner.get_or_create(name).await
    }

    async fn open(&self, name: &str) -> Result<Collection> {
        self.inner.open(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn count(&self, collection: &Collection) -> Result<usize> {
        self.inner.count(collection).await
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.inner.delete_collection(name).await
    }

    async fn upsert_batch(&self, collection: &Collection, batch: &[Entry]) -> Result<()> {
        if self.batches.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(Error::Storage("disk full".into()));
        }
        self.inner.upsert_batch(collection, batch).await
    }

    async fn search(&self, collection: &Collection, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        self.inner.search(collection, query, k).await
    }
}

#[tokio::test]
async fn open_missing_collection_is_not_indexed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 10).await {
        assert!(!store.exists("legal_acts").await?);
        let err = store.open("legal_acts").await.expect_err("absent");
        assert!(matches!(err, Error::NotIndexed(_)), "{:?}: {err}", store.backend());
    }
    Ok(())
}

#[tokio::test]
async fn upsert_by_id_keeps_count_and_latest_content() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 2).await {
        let col = store.get_or_create("legal_acts").await?;
        let entries = vec![
            entry("a", vec![1.0, 0.0, 0.0]),
            entry("b", vec![0.0, 1.0, 0.0]),
            entry("c", vec![0.0, 0.0, 1.0]),
        ];
        assert_eq!(store.add(&col, &entries).await?, 3);
        assert_eq!(store.add(&col, &entries).await?, 3);
        assert_eq!(store.count(&col).await?, 3, "{:?}", store.backend());

        let mut changed = entry("b", vec![0.0, 1.0, 0.0]);
        changed.document = "amended".into();
        store.add(&col, &[changed]).await?;
        let res = store.query(&col, &[0.0, 1.0, 0.0], 1).await?;
        assert_eq!(res.hits[0].id, "b");
        assert_eq!(res.hits[0].document, "amended");
        assert_eq!(store.count(&col).await?, 3);
    }
    Ok(())
}

#[tokio::test]
async fn query_orders_by_score_and_clamps_top_k() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 100).await {
        let col = store.get_or_create("legal_acts").await?;
        store
            .add(
                &col,
                &[
                    entry("far", vec![0.0, 0.0, 1.0]),
                    entry("near", vec![1.0, 0.1, 0.0]),
                    entry("exact", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await?;
        let res = store.query(&col, &[1.0, 0.0, 0.0], 10).await?;
        let ids: Vec<_> = res.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"], "{:?}", store.backend());
        assert!(res.hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!((res.hits[0].score - 1.0).abs() < 1e-4);
        assert_eq!(res.hits[0].metadata.act_title, "Indian Penal Code");

        assert!(store.query(&col, &[1.0, 0.0, 0.0], 0).await?.is_empty());
        assert!(store.query(&col, &[0.0, 0.0, 0.0], 3).await?.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn ties_follow_insertion_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 1).await {
        let col = store.get_or_create("legal_acts").await?;
        let same = vec![0.0, 1.0, 0.0];
        let entries = [entry("first", same.clone()), entry("second", same.clone()), entry("third", same.clone())];
        store.add(&col, &entries).await?;
        let res = store.query(&col, &same, 2).await?;
        let ids: Vec<_> = res.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"], "{:?}", store.backend());
    }
    Ok(())
}

#[tokio::test]
async fn dimension_mismatch_writes_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 1).await {
        let col = store.get_or_create("legal_acts").await?;
        let err = store
            .add(&col, &[entry("ok", vec![1.0, 0.0, 0.0]), entry("bad", vec![1.0, 0.0])])
            .await
            .expect_err("mixed dims");
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(store.count(&col).await?, 0, "{:?}", store.backend());

        let err = store.query(&col, &[1.0], 1).await.expect_err("query dim");
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
    Ok(())
}

#[tokio::test]
async fn persistent_collections_survive_reopen() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    {
        let store = LanceStore::open(tmp.path(), 3, Metric::L2, 100).await?;
        let col = store.get_or_create("legal_acts").await?;
        store.add(&col, &[entry("a", vec![1.0, 2.0, 3.0]), entry("b", vec![3.0, 2.0, 1.0])]).await?;
    }

    // Configured metric differs; the recorded one wins.
    let store = LanceStore::open(tmp.path(), 3, Metric::Cosine, 100).await?;
    let col = store.get_or_create("legal_acts").await?;
    assert_eq!(col.metric, Metric::L2);
    assert_eq!(store.count(&col).await?, 2);
    let res = store.query(&col, &[1.0, 2.0, 3.0], 1).await?;
    assert_eq!(res.hits[0].id, "a");
    assert!(res.hits[0].score.abs() < 1e-4, "exact match has zero distance");

    store.add(&col, &[entry("c", vec![1.0, 2.0, 3.0])]).await?;
    let res = store.query(&col, &[1.0, 2.0, 3.0], 2).await?;
    let ids: Vec<_> = res.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"], "new rows sort after existing ties");
    Ok(())
}

#[tokio::test]
async fn persistent_dimension_is_checked_on_open() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    {
        let store = LanceStore::open(tmp.path(), 3, Metric::Cosine, 100).await?;
        store.get_or_create("legal_acts").await?;
    }
    let store = LanceStore::open(tmp.path(), 5, Metric::Cosine, 100).await?;
    let err = store.get_or_create("legal_acts").await.expect_err("dim changed");
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 5 }));
    Ok(())
}

#[tokio::test]
async fn catalog_dimension_must_match_table() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    {
        let store = LanceStore::open(tmp.path(), 3, Metric::Cosine, 100).await?;
        store.get_or_create("legal_acts").await?;
    }
    let conn = open_db(tmp.path()).await?;
    record_collection(&conn, "legal_acts", Metric::Cosine, 7).await?;

    let store = LanceStore::open(tmp.path(), 3, Metric::Cosine, 100).await?;
    let err = store.open("legal_acts").await.expect_err("catalog disagrees");
    assert!(matches!(err, Error::Storage(ref m) if m.contains("dimension 7")), "{err}");
    Ok(())
}

#[tokio::test]
async fn delete_collection_is_explicit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 10).await {
        let col = store.get_or_create("legal_acts").await?;
        store.add(&col, &[entry("a", vec![1.0, 0.0, 0.0])]).await?;
        assert!(store.delete_collection("legal_acts").await?);
        assert!(!store.exists("legal_acts").await?);
        assert!(!store.delete_collection("legal_acts").await?);
        let col = store.get_or_create("legal_acts").await?;
        assert_eq!(store.count(&col).await?, 0);
    }
    Ok(())
}

#[tokio::test]
async fn dropped_collection_handle_is_not_indexed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for store in backends(&tmp, 10).await {
        let col = store.get_or_create("acts").await?;
        store.add(&col, &[entry("a", vec![1.0, 0.0, 0.0])]).await?;
        assert!(store.delete_collection("acts").await?);

        let err = store.query(&col, &[1.0, 0.0, 0.0], 3).await.expect_err("stale handle");
        assert!(matches!(err, Error::NotIndexed(ref n) if n == "acts"), "{:?}: {err}", store.backend());
        assert!(matches!(store.count(&col).await, Err(Error::NotIndexed(_))));
        let err = store.add(&col, &[entry("b", vec![0.0, 1.0, 0.0])]).await.expect_err("stale handle");
        assert!(matches!(err, Error::NotIndexed(_)), "{:?}: {err}", store.backend());
    }
    Ok(())
}

#[tokio::test]
async fn failed_batch_keeps_earlier_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for inner in backends(&tmp, 2).await {
        let store = FailingBatch { inner, fail_at: 1, batches: AtomicUsize::new(0) };
        let col = store.get_or_create("legal_acts").await?;
        let entries: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|id| entry(id, vec![1.0, 0.0, 0.0])).collect();

        let err = store.add(&col, &entries).await.expect_err("second batch fails");
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.count(&col).await?, 2, "{:?}", store.backend());
        let ids: Vec<_> = store.query(&col, &[1.0, 0.0, 0.0], 5).await?.into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
    Ok(())
}

#[tokio::test]
async fn open_store_follows_config() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = open_store(&StoreConfig::ephemeral(), 8).await?;
    assert_eq!(store.backend(), BackendKind::Ephemeral);

    let cfg = StoreConfig { path: tmp.path().join("lance").to_string_lossy().to_string(), ..StoreConfig::default() };
    let store = open_store(&cfg, 8).await?;
    assert_eq!(store.backend(), BackendKind::Persistent);
    assert_eq!(store.batch_size(), 5000);
    Ok(())
}
