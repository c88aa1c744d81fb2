use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use lexdb_core::error::{Error, Result};
use lexdb_core::types::{ChunkMetadata, Metric, QueryHit};

use crate::similarity::rank;

/// Extra candidates fetched so ties at the cut-off can be ordered by insertion.
const TIE_MARGIN: usize = 16;

fn distance_type(metric: Metric) -> DistanceType {
    match metric {
        Metric::Cosine => DistanceType::Cosine,
        Metric::L2 => DistanceType::L2,
    }
}

/// Lance reports cosine distance and squared L2 distance.
fn distance_to_score(metric: Metric, distance: f32) -> f32 {
    match metric {
        Metric::Cosine if distance.is_nan() => 0.0,
        Metric::Cosine => 1.0 - distance,
        Metric::L2 => -distance.max(0.0).sqrt(),
    }
}

/// Exact top-k over the table, ordered by score then `seq`.
pub async fn nearest(table: &Table, metric: Metric, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
    let mut stream = table
        .vector_search(query.to_vec())
        .map_err(Error::storage)?
        .distance_type(distance_type(metric))
        .limit(k + TIE_MARGIN)
        .execute()
        .await
        .map_err(Error::storage)?;
    let mut scored = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
        decode_hits(&batch, metric, &mut scored)?;
    }
    Ok(rank(scored, k))
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Storage(format!("missing {name} column")))
}

fn decode_hits(batch: &RecordBatch, metric: Metric, out: &mut Vec<(QueryHit, i64)>) -> Result<()> {
    let ids = strings(batch, "id")?;
    let content = strings(batch, "content")?;
    let source = strings(batch, "source")?;
    let act_title = strings(batch, "act_title")?;
    let section_name = strings(batch, "section_name")?;
    let section_number = strings(batch, "section_number")?;
    let seq = batch
        .column_by_name("seq")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| Error::Storage("missing seq column".into()))?;
    let distance = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::Storage("missing _distance column".into()))?;

    for i in 0..batch.num_rows() {
        let d = if distance.is_null(i) { f32::NAN } else { distance.value(i) };
        let hit = QueryHit {
            id: ids.value(i).to_string(),
            document: content.value(i).to_string(),
            metadata: ChunkMetadata {
                source: source.value(i).to_string(),
                act_title: act_title.value(i).to_string(),
                section_name: section_name.value(i).to_string(),
                section_number: section_number.value(i).to_string(),
            },
            score: distance_to_score(metric, d),
        };
        out.push((hit, seq.value(i)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_map_to_higher_is_better() {
        assert!((distance_to_score(Metric::Cosine, 0.25) - 0.75).abs() < 1e-6);
        assert_eq!(distance_to_score(Metric::Cosine, f32::NAN), 0.0);
        assert!((distance_to_score(Metric::L2, 25.0) + 5.0).abs() < 1e-6);
        assert!(distance_to_score(Metric::L2, 1.0) > distance_to_score(Metric::L2, 4.0));
    }
}
