use arrow_array::{
    FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Table;
use std::collections::HashMap;
use std::sync::Arc;

use lexdb_core::error::{Error, Result};
use lexdb_core::types::Entry;

use crate::schema::build_collection_schema;
use crate::table::in_filter;

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

/// Rows of one batch; `seqs[i]` is the insertion position of `entries[i]`.
pub fn entries_to_record_batch(entries: &[Entry], seqs: &[i64], dim: usize) -> Result<RecordBatch> {
    let now = Utc::now().timestamp_millis();
    let vectors = entries.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let width = dim as i32;
    RecordBatch::try_new(
        build_collection_schema(dim),
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.id.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.document.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.metadata.source.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.metadata.act_title.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.metadata.section_name.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.metadata.section_number.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| hash_content(&e.document)))),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
            Arc::new(Int64Array::from(seqs.to_vec())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, width)),
        ],
    )
    .map_err(Error::storage)
}

/// Sequence numbers already assigned to any of `ids`.
pub async fn existing_seqs(table: &Table, ids: &[&str]) -> Result<HashMap<String, i64>> {
    let mut found = HashMap::new();
    if ids.is_empty() {
        return Ok(found);
    }
    let mut stream = table
        .query()
        .select(Select::columns(&["id", "seq"]))
        .only_if(in_filter("id", ids))
        .limit(ids.len())
        .execute()
        .await
        .map_err(Error::storage)?;
    while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
        let id_col = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::Storage("missing id column".into()))?;
        let seq_col = batch
            .column_by_name("seq")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| Error::Storage("missing seq column".into()))?;
        for i in 0..batch.num_rows() {
            found.insert(id_col.value(i).to_string(), seq_col.value(i));
        }
    }
    Ok(found)
}

/// Highest sequence number in the table, or -1 when empty.
pub async fn max_seq(table: &Table) -> Result<i64> {
    let rows = table.count_rows(None).await.map_err(Error::storage)?;
    if rows == 0 {
        return Ok(-1);
    }
    let mut stream = table
        .query()
        .select(Select::columns(&["seq"]))
        .limit(rows)
        .execute()
        .await
        .map_err(Error::storage)?;
    let mut max = -1i64;
    while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
        if let Some(col) = batch.column_by_name("seq").and_then(|c| c.as_any().downcast_ref::<Int64Array>()) {
            max = col.iter().flatten().fold(max, i64::max);
        }
    }
    Ok(max)
}

/// Insert-or-overwrite by id in a single commit.
pub async fn merge_batch(table: &Table, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    let mut mi = table.merge_insert(&["id"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(Error::storage)?;
    Ok(())
}
