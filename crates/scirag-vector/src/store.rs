use std::sync::Arc;

use anyhow::anyhow;
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, RecordBatchReader,
    StringArray, TimestampMillisecondArray,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use tokio::sync::Mutex;

use scirag_core::config::{expand_path, StoreSettings};
use scirag_core::error::{Error, Result};
use scirag_core::traits::VectorIndex;
use scirag_core::types::{Chunk, ChunkId, DistanceMetric, NewChunk, RetrievedCandidate, SourceKind};

use crate::check_width;
use crate::schema::{self, build_chunk_schema, vector_width};
use crate::table::{ensure_table, open_db};

/// Chunk table in LanceDB, searched by vector similarity.
///
/// Writes are serialized through `next_id`, which also hands out ids. Reads
/// share the connection and need no locking.
pub struct LanceChunkStore {
    conn: Connection,
    table_name: String,
    dim: usize,
    metric: DistanceMetric,
    nprobes: usize,
    next_id: Mutex<ChunkId>,
}

impl LanceChunkStore {
    pub async fn open(settings: &StoreSettings, dim: usize) -> Result<Self> {
        let uri = expand_path(&settings.uri);
        let conn = open_db(&uri.to_string_lossy()).await.map_err(Error::store)?;
        let width = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dim {dim} too large")))?;
        let created = ensure_table(&conn, &settings.table, build_chunk_schema(width)).await.map_err(Error::store)?;
        let store = Self {
            conn,
            table_name: settings.table.clone(),
            dim,
            metric: settings.metric,
            nprobes: settings.nprobes,
            next_id: Mutex::new(1),
        };
        let table = store.table().await?;
        let existing = table.schema().await.map_err(Error::store)?;
        match vector_width(&existing) {
            Some(w) if w == dim => {}
            Some(w) => return Err(Error::DimensionMismatch { expected: w, actual: dim }),
            None => return Err(Error::InvalidConfig(format!("table '{}' has no vector column", settings.table))),
        }
        let max_id = max_id(&table).await.map_err(Error::store)?;
        *store.next_id.lock().await = max_id + 1;
        tracing::info!(uri = %uri.display(), table = %settings.table, created, next_id = max_id + 1, "opened lancedb chunk store");
        Ok(store)
    }

    async fn table(&self) -> Result<Table> {
        self.conn.open_table(&self.table_name).execute().await.map_err(Error::store)
    }

    pub async fn count(&self) -> Result<usize> {
        self.table().await?.count_rows(None).await.map_err(Error::store)
    }

    async fn find_existing(&self, table: &Table, chunk: &NewChunk) -> Result<Option<ChunkId>> {
        let section = match &chunk.section {
            Some(s) => format!("{} = '{}'", schema::SECTION, s.replace('\'', "''")),
            None => format!("{} IS NULL", schema::SECTION),
        };
        let filter = format!(
            "{} = '{}' AND {} AND {} = {}",
            schema::BOOK_TITLE,
            chunk.title.replace('\'', "''"),
            section,
            schema::CHUNK_IDX,
            chunk.position
        );
        let mut stream = table
            .query()
            .only_if(filter)
            .select(Select::columns(&[schema::ID]))
            .limit(1)
            .execute()
            .await
            .map_err(Error::store)?;
        while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
            if batch.num_rows() > 0 {
                return Ok(Some(column::<Int64Array>(&batch, schema::ID).map_err(Error::store)?.value(0)));
            }
        }
        Ok(None)
    }

    fn to_record_batch(&self, chunk: &Chunk) -> anyhow::Result<RecordBatch> {
        let width = i32::try_from(self.dim)?;
        let vectors: Vec<Option<Vec<Option<f32>>>> =
            vec![chunk.embedding.as_ref().map(|v| v.iter().copied().map(Some).collect())];
        Ok(RecordBatch::try_new(
            build_chunk_schema(width),
            vec![
                Arc::new(Int64Array::from(vec![chunk.id])),
                Arc::new(StringArray::from(vec![chunk.title.clone()])),
                Arc::new(StringArray::from(vec![chunk.section.clone()])),
                Arc::new(Int32Array::from(vec![i32::try_from(chunk.position)?])),
                Arc::new(StringArray::from(vec![chunk.body.clone()])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
                Arc::new(TimestampMillisecondArray::from(vec![chunk.created_at.timestamp_millis()])),
            ],
        )?)
    }
}

fn to_lance(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::Dot => DistanceType::Dot,
        DistanceMetric::L2 => DistanceType::L2,
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or mistyped"))
}

async fn max_id(table: &Table) -> anyhow::Result<ChunkId> {
    let mut max = 0;
    let mut stream = table.query().select(Select::columns(&[schema::ID])).execute().await?;
    while let Some(batch) = stream.try_next().await? {
        let ids = column::<Int64Array>(&batch, schema::ID)?;
        max = ids.iter().flatten().fold(max, ChunkId::max);
    }
    Ok(max)
}

/// Rows of a batch as chunks, paired with `_distance` when the batch came from
/// a vector search.
fn read_chunks(batch: &RecordBatch) -> anyhow::Result<Vec<(Chunk, Option<f32>)>> {
    let ids = column::<Int64Array>(batch, schema::ID)?;
    let titles = column::<StringArray>(batch, schema::BOOK_TITLE)?;
    let sections = column::<StringArray>(batch, schema::SECTION)?;
    let positions = column::<Int32Array>(batch, schema::CHUNK_IDX)?;
    let bodies = column::<StringArray>(batch, schema::BODY)?;
    let created = column::<TimestampMillisecondArray>(batch, schema::CREATED_AT)?;
    let vectors = column::<FixedSizeListArray>(batch, schema::VECTOR).ok();
    let distances = column::<Float32Array>(batch, schema::DISTANCE).ok();

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let embedding = vectors
            .filter(|v| v.is_valid(i))
            .map(|v| v.value(i).as_primitive::<Float32Type>().values().to_vec());
        let distance = distances.filter(|d| d.is_valid(i)).map(|d| d.value(i));
        let chunk = Chunk {
            id: ids.value(i),
            title: titles.value(i).to_string(),
            section: sections.is_valid(i).then(|| sections.value(i).to_string()),
            position: u32::try_from(positions.value(i))?,
            body: bodies.value(i).to_string(),
            embedding,
            created_at: Utc.timestamp_millis_opt(created.value(i)).single().unwrap_or_default(),
        };
        out.push((chunk, distance));
    }
    Ok(out)
}

#[async_trait]
impl VectorIndex for LanceChunkStore {
    fn metric(&self) -> DistanceMetric { self.metric }

    async fn insert(&self, new: NewChunk) -> Result<Chunk> {
        check_width(self.dim, new.embedding.as_deref())?;
        let mut next_id = self.next_id.lock().await;
        let table = self.table().await?;
        if let Some(existing) = self.find_existing(&table, &new).await? {
            return Err(Error::DuplicateChunk {
                title: new.title,
                section: new.section.unwrap_or_else(|| "<none>".to_string()),
                position: new.position,
                existing,
            });
        }
        let chunk = Chunk {
            id: *next_id,
            title: new.title,
            section: new.section,
            position: new.position,
            body: new.body,
            embedding: new.embedding,
            created_at: Utc::now(),
        };
        let batch = self.to_record_batch(&chunk).map_err(Error::store)?;
        let schema = batch.schema();
        let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        table.add(reader).execute().await.map_err(Error::store)?;
        *next_id += 1;
        tracing::debug!(id = chunk.id, title = %chunk.title, "inserted chunk");
        Ok(chunk)
    }

    async fn nearest(&self, vector: &[f32], metric: DistanceMetric, k: usize) -> Result<Vec<RetrievedCandidate>> {
        if metric != self.metric {
            return Err(Error::InvalidConfig(format!(
                "query metric {metric:?} does not match index metric {:?}",
                self.metric
            )));
        }
        check_width(self.dim, Some(vector))?;
        let table = self.table().await?;
        if k == 0 || table.count_rows(None).await.map_err(Error::store)? == 0 {
            return Ok(Vec::new());
        }
        let mut stream = table
            .vector_search(vector.to_vec())
            .map_err(Error::store)?
            .column(schema::VECTOR)
            .distance_type(to_lance(metric))
            .nprobes(self.nprobes)
            .limit(k)
            .execute()
            .await
            .map_err(Error::store)?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
            for (chunk, distance) in read_chunks(&batch).map_err(Error::store)? {
                // Rows without an embedding have no meaningful distance.
                let Some(d) = distance.filter(|d| d.is_finite()) else { continue };
                if chunk.embedding.is_none() { continue; }
                hits.push(RetrievedCandidate { chunk, score: metric.similarity(d), source: SourceKind::Vector });
            }
        }
        Ok(hits)
    }

    async fn scan(&self) -> Result<Vec<Chunk>> {
        let table = self.table().await?;
        let mut stream = table.query().execute().await.map_err(Error::store)?;
        let mut chunks = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
            chunks.extend(read_chunks(&batch).map_err(Error::store)?.into_iter().map(|(c, _)| c));
        }
        chunks.sort_by_key(|c| c.id);
        Ok(chunks)
    }
}
