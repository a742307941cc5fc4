use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const TEXT: &str = "text";
pub const HAS_DATE: &str = "has_date";
pub const HAS_NAME: &str = "has_name";
pub const VECTOR: &str = "vector";

/// Row layout of the chunk table; `dim` is fixed per corpus.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(TEXT, DataType::Utf8, false),
		Field::new(HAS_DATE, DataType::Boolean, false),
		Field::new(HAS_NAME, DataType::Boolean, false),
		Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Vector width declared by a table schema, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
