//! LanceDB connection and table housekeeping.
use arrow_array::RecordBatchIterator;
use arrow_schema::Schema;
use lancedb::{connect, Connection};
use std::sync::Arc;

pub async fn open_db(uri: &str) -> lancedb::Result<Connection> {
	connect(uri).execute().await
}

pub async fn table_exists(conn: &Connection, name: &str) -> lancedb::Result<bool> {
	let names = conn.table_names().execute().await?;
	Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> lancedb::Result<()> {
	if table_exists(conn, name).await? {
		return Ok(());
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
	conn.create_table(name, Box::new(iter)).execute().await?;
	Ok(())
}

/// Drop `name` with its schema; returns whether a table was removed.
pub async fn drop_table_if_exists(conn: &Connection, name: &str) -> lancedb::Result<bool> {
	if !table_exists(conn, name).await? {
		return Ok(false);
	}
	conn.drop_table(name, &[]).await?;
	Ok(true)
}
