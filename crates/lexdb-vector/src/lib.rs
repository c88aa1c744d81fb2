//! Collection stores: an in-memory backend and a LanceDB-backed one.

use std::sync::Arc;

use lexdb_core::config::StoreConfig;
use lexdb_core::error::Result;
use lexdb_core::traits::CollectionStore;
use lexdb_core::types::BackendKind;

pub mod lance;
pub mod memory;
pub mod schema;
pub mod search;
pub mod similarity;
pub mod table;
pub mod writer;

pub use lance::LanceStore;
pub use memory::EphemeralStore;

/// Build the configured backend for vectors of width `dim`.
pub async fn open_store(cfg: &StoreConfig, dim: usize) -> Result<Arc<dyn CollectionStore>> {
    match cfg.backend {
        BackendKind::Ephemeral => Ok(Arc::new(EphemeralStore::new(dim, cfg.metric, cfg.batch_size))),
        BackendKind::Persistent => {
            let store = LanceStore::open(&cfg.resolved_path(), dim, cfg.metric, cfg.batch_size).await?;
            Ok(Arc::new(store))
        }
    }
}
