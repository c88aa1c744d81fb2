//! LanceDB connection and housekeeping helpers.
//!
//! Opens the database directory, creates empty tables, and keeps a small
//! catalog table recording each collection's metric and dimension.

use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;

use lexdb_core::error::{Error, Result};
use lexdb_core::types::Metric;

use crate::schema::{build_catalog_schema, CATALOG_TABLE};

pub async fn open_db(path: &Path) -> Result<Connection> {
    std::fs::create_dir_all(path)?;
    connect(path.to_string_lossy().as_ref()).execute().await.map_err(Error::storage)
}

/// Lance table names allow ASCII letters, digits, `_`, `-` and `.`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if name.is_empty() || !valid_chars || name == CATALOG_TABLE {
        return Err(Error::InvalidConfig(format!("invalid collection name '{name}'")));
    }
    Ok(())
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(Error::storage)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::storage)?;
    Ok(())
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL `IN` filter over string keys.
pub fn in_filter(column: &str, values: &[&str]) -> String {
    let list = values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(",");
    format!("{column} IN ({list})")
}

pub async fn record_collection(conn: &Connection, name: &str, metric: Metric, dim: usize) -> Result<()> {
    ensure_table(conn, CATALOG_TABLE, build_catalog_schema()).await?;
    let t = conn.open_table(CATALOG_TABLE).execute().await.map_err(Error::storage)?;
    #[allow(clippy::cast_possible_wrap)]
    let dim = dim as i64;
    let rb = RecordBatch::try_new(
        build_catalog_schema(),
        vec![
            Arc::new(StringArray::from(vec![name.to_string()])),
            Arc::new(StringArray::from(vec![metric.as_str().to_string()])),
            Arc::new(Int64Array::from(vec![dim])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(Error::storage)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_catalog_schema()));
    let mut mi = t.merge_insert(&["name"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(Error::storage)?;
    Ok(())
}

/// Metric and dimension recorded for `name`, if any.
pub async fn lookup_collection(conn: &Connection, name: &str) -> Result<Option<(Metric, usize)>> {
    if !table_exists(conn, CATALOG_TABLE).await? {
        return Ok(None);
    }
    let t = conn.open_table(CATALOG_TABLE).execute().await.map_err(Error::storage)?;
    let mut stream = t
        .query()
        .only_if(format!("name = {}", quote(name)))
        .limit(1)
        .execute()
        .await
        .map_err(Error::storage)?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(Error::storage)? {
        if batch.num_rows() == 0 {
            continue;
        }
        let metric = batch
            .column_by_name("metric")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::Storage("catalog.metric column missing".into()))?
            .value(0)
            .parse::<Metric>()?;
        let dim = batch
            .column_by_name("dim")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| Error::Storage("catalog.dim column missing".into()))?
            .value(0);
        return Ok(Some((metric, usize::try_from(dim).map_err(Error::storage)?)));
    }
    Ok(None)
}

pub async fn forget_collection(conn: &Connection, name: &str) -> Result<()> {
    if !table_exists(conn, CATALOG_TABLE).await? {
        return Ok(());
    }
    let t = conn.open_table(CATALOG_TABLE).execute().await.map_err(Error::storage)?;
    t.delete(&format!("name = {}", quote(name))).await.map_err(Error::storage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_restricted() {
        assert!(validate_collection_name("legal_acts-v2.0").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("acts/../x").is_err());
        assert!(validate_collection_name(CATALOG_TABLE).is_err());
    }

    #[test]
    fn in_filter_quotes_values() {
        assert_eq!(in_filter("id", &["a", "o'b"]), "id IN ('a','o''b')");
    }
}
