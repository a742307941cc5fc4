//! LanceDB-backed vector store for local directories or managed (`db://`) databases.
//!
//! Rows are upserted with `merge_insert` on `id`, so re-ingesting a corpus
//! replaces rows instead of duplicating them. Batches are independent; a
//! failure part-way leaves earlier batches written.
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, BooleanArray, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use tracing::{debug, info, warn};

use bookqa_core::config::VectorStoreSettings;
use bookqa_core::error::{Error, Result};
use bookqa_core::traits::VectorStore;
use bookqa_core::types::{EntryMetadata, IndexEntry, SearchFilter, VectorMatch};

use crate::exact::rank;
use crate::schema::{build_chunk_schema, vector_dim, HAS_DATE, HAS_NAME, ID, TEXT};
use crate::table::{drop_table_if_exists, ensure_table, open_db, table_exists};

pub struct RemoteBackend {
    conn: Option<Connection>,
    uri: String,
    table: String,
    upsert_batch_size: usize,
    unavailable_reason: Option<String>,
}

fn store_err(e: impl std::fmt::Display) -> Error {
    Error::Store(e.to_string())
}

impl RemoteBackend {
    /// Connect to `uri`. A failed connection yields an unavailable backend
    /// rather than an error; operations then return `StoreUnavailable`.
    pub async fn connect(uri: &str, table: &str, upsert_batch_size: usize) -> Self {
        let probe = async {
            let conn = open_db(uri).await?;
            table_exists(&conn, table).await?;
            Ok::<_, lancedb::Error>(conn)
        };
        let (conn, unavailable_reason) = match probe.await {
            Ok(conn) => {
                info!(uri, table, "connected to vector database");
                (Some(conn), None)
            }
            Err(e) => {
                warn!(uri, error = %e, "vector database unavailable");
                (None, Some(e.to_string()))
            }
        };
        Self { conn, uri: uri.to_string(), table: table.to_string(), upsert_batch_size: upsert_batch_size.max(1), unavailable_reason }
    }

    pub async fn from_settings(settings: &VectorStoreSettings) -> Self {
        Self::connect(&settings.uri, &settings.table, settings.upsert_batch_size).await
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| {
            Error::StoreUnavailable(format!(
                "{}: {}",
                self.uri,
                self.unavailable_reason.as_deref().unwrap_or("not connected")
            ))
        })
    }

    async fn open_existing(&self) -> Result<Option<lancedb::Table>> {
        let conn = self.conn()?;
        if !table_exists(conn, &self.table).await.map_err(store_err)? {
            return Ok(None);
        }
        Ok(Some(conn.open_table(&self.table).execute().await.map_err(store_err)?))
    }

    async fn table_dim(table: &lancedb::Table) -> Result<Option<usize>> {
        let schema = table.schema().await.map_err(store_err)?;
        Ok(vector_dim(&schema))
    }

    /// Number of rows currently stored.
    pub async fn count(&self) -> Result<usize> {
        match self.open_existing().await? {
            Some(t) => t.count_rows(None).await.map_err(store_err),
            None => Ok(0),
        }
    }

    fn to_record_batch(entries: &[IndexEntry], dim: i32) -> Result<RecordBatch> {
        let ids: Vec<String> = entries.iter().map(|e| e.chunk_id.to_string()).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.metadata.text.as_str()).collect();
        let has_date: Vec<bool> = entries.iter().map(|e| e.metadata.has_date).collect();
        let has_name: Vec<bool> = entries.iter().map(|e| e.metadata.has_name).collect();
        let vectors = entries.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
        RecordBatch::try_new(
            build_chunk_schema(dim),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(BooleanArray::from(has_date)),
                Arc::new(BooleanArray::from(has_name)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
            ],
        )
        .map_err(store_err)
    }
}

fn predicate(filter: &SearchFilter) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(v) = filter.has_date {
        parts.push(format!("{HAS_DATE} = {v}"));
    }
    if let Some(v) = filter.has_name {
        parts.push(format!("{HAS_NAME} = {v}"));
    }
    if parts.is_empty() { None } else { Some(parts.join(" AND ")) }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::Store(format!("result column '{name}' missing or mistyped")))
}

#[async_trait]
impl VectorStore for RemoteBackend {
    fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    async fn store(&self, entries: &[IndexEntry]) -> Result<()> {
        let conn = self.conn()?;
        let Some(first) = entries.first() else { return Ok(()) };
        let dim = first.vector.len();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }
        let dim_i32 = i32::try_from(dim).map_err(store_err)?;
        ensure_table(conn, &self.table, build_chunk_schema(dim_i32)).await.map_err(store_err)?;
        let table = conn.open_table(&self.table).execute().await.map_err(store_err)?;
        if let Some(existing) = Self::table_dim(&table).await? {
            if existing != dim {
                return Err(Error::DimensionMismatch { expected: existing, actual: dim });
            }
        }

        for (i, batch) in entries.chunks(self.upsert_batch_size).enumerate() {
            let rb = Self::to_record_batch(batch, dim_i32)?;
            let schema = rb.schema();
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
            let mut mi = table.merge_insert(&[ID]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            mi.execute(reader).await.map_err(store_err)?;
            debug!(batch = i, rows = batch.len(), "upserted vectors");
        }
        info!(rows = entries.len(), table = %self.table, "stored vectors");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize, filter: Option<&SearchFilter>) -> Result<Vec<VectorMatch>> {
        let Some(table) = self.open_existing().await? else { return Ok(Vec::new()) };
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = Self::table_dim(&table).await? {
            if dim != query.len() {
                return Err(Error::DimensionMismatch { expected: dim, actual: query.len() });
            }
        }

        let mut q = table
            .vector_search(query.to_vec())
            .map_err(store_err)?
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(p) = filter.and_then(predicate) {
            q = q.only_if(p);
        }
        let mut stream = q.execute().await.map_err(store_err)?;

        let mut matches = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(store_err)? {
            let ids = column::<StringArray>(&batch, ID)?;
            let texts = column::<StringArray>(&batch, TEXT)?;
            let has_date = column::<BooleanArray>(&batch, HAS_DATE)?;
            let has_name = column::<BooleanArray>(&batch, HAS_NAME)?;
            let distance = column::<Float32Array>(&batch, "_distance")?;
            for i in 0..batch.num_rows() {
                let chunk_id = ids.value(i).parse::<usize>().map_err(store_err)?;
                matches.push(VectorMatch {
                    chunk_id,
                    score: 1.0 - distance.value(i),
                    metadata: EntryMetadata {
                        text: texts.value(i).to_string(),
                        has_date: has_date.value(i),
                        has_name: has_name.value(i),
                    },
                });
            }
        }
        Ok(rank(matches, top_k))
    }

    async fn clear(&self) -> Result<()> {
        // Dropping resets the vector width; the next store recreates the table.
        if drop_table_if_exists(self.conn()?, &self.table).await.map_err(store_err)? {
            info!(table = %self.table, "cleared vectors");
        }
        Ok(())
    }
}
