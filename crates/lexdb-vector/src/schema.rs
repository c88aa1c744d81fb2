use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Table holding one row per collection: name, metric, dimension.
pub const CATALOG_TABLE: &str = "lexdb_catalog";

pub fn build_collection_schema(dim: usize) -> Arc<Schema> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let dim = dim as i32;
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("act_title", DataType::Utf8, false),
        Field::new("section_name", DataType::Utf8, false),
        Field::new("section_number", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("indexed_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("seq", DataType::Int64, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

pub fn build_catalog_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("metric", DataType::Utf8, false),
        Field::new("dim", DataType::Int64, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

/// Vector width recorded in a collection table's schema.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_dim_roundtrips_through_schema() {
        assert_eq!(vector_dim(&build_collection_schema(384)), Some(384));
        assert_eq!(vector_dim(&build_catalog_schema()), None);
    }
}
