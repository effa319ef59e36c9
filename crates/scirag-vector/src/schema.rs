use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const ID: &str = "id";
pub const BOOK_TITLE: &str = "book_title";
pub const SECTION: &str = "section";
pub const CHUNK_IDX: &str = "chunk_idx";
pub const BODY: &str = "body";
pub const VECTOR: &str = "vector";
pub const CREATED_AT: &str = "created_at";
/// Column LanceDB appends to vector search results.
pub const DISTANCE: &str = "_distance";

/// Chunk table layout. `vector` is nullable: rows may be stored before their
/// embedding is computed.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Int64, false),
		Field::new(BOOK_TITLE, DataType::Utf8, false),
		Field::new(SECTION, DataType::Utf8, true),
		Field::new(CHUNK_IDX, DataType::Int32, false),
		Field::new(BODY, DataType::Utf8, false),
		Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
		Field::new(CREATED_AT, DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_width(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
