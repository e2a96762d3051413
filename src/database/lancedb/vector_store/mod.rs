
use super::{CollectionManifest, IndexStats, QueryHit};
use crate::config::Config;
use crate::embeddings::{DocumentChunk, EmbeddingProvider};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase, Select},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do when a collection was built by a different embedding function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Refuse to open the collection
    #[default]
    Reject,
    /// Drop every entry and re-stamp the collection for the current function
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub collection: String,
    /// Chunks embedded and committed per write
    pub batch_size: usize,
    pub on_embedding_mismatch: MismatchPolicy,
}

impl Default for VectorStoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            collection: "integration_docs".to_string(),
            batch_size: 100,
            on_embedding_mismatch: MismatchPolicy::Reject,
        }
    }
}

/// Vector database store using LanceDB for similarity search
///
/// Writes (`add_documents`, `clear`) take `&mut self`; each batch is a single
/// LanceDB append, so readers never observe half of a batch.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    manifest_path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    batch_size: usize,
}

impl VectorStore {
    /// Open (or create) the configured collection for `embedder`
    ///
    /// Fails when the database cannot be opened, or when the collection was
    /// built by another embedding function and the mismatch policy is `reject`.
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_name = config.vector_store.collection.clone();
        let manifest_path = db_path.join(format!("{}.manifest.json", table_name));
        let dimension = embedder.dimension();

        let store = Self {
            connection,
            table_name,
            manifest_path,
            embedder,
            dimension,
            batch_size: config.vector_store.batch_size.max(1),
        };

        store
            .initialize_collection(config.vector_store.on_embedding_mismatch)
            .await?;

        info!(
            "Vector store '{}' ready ({}, {} dimensions)",
            store.table_name,
            store.embedder.model_id(),
            store.dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Create the collection, or verify that an existing one was built by our embedder
    async fn initialize_collection(&self, policy: MismatchPolicy) -> Result<()> {
        if !self.table_exists().await? {
            info!(
                "Creating collection '{}' with {} dimensions",
                self.table_name, self.dimension
            );
            self.create_table().await?;
            return self.write_manifest();
        }

        let existing_dimension = self.detect_existing_vector_dimension().await?;
        let manifest = self.read_manifest()?;
        let rows = self.count().await?;

        let compatible = match &manifest {
            Some(manifest) => {
                existing_dimension == self.dimension
                    && manifest.is_compatible_with(self.embedder.model_id(), self.dimension)
            }
            // An unstamped collection is only trusted while it is empty
            None => existing_dimension == self.dimension && rows == 0,
        };

        if compatible {
            if manifest.is_none() {
                self.write_manifest()?;
            }
            debug!("Collection '{}' matches current embedder", self.table_name);
            return Ok(());
        }

        let built_with = manifest.as_ref().map_or_else(
            || format!("an unknown embedding function ({} dimensions)", existing_dimension),
            |m| format!("'{}' ({} dimensions)", m.embedding_model, m.dimension),
        );

        match policy {
            MismatchPolicy::Reject => Err(RagError::Database(format!(
                "Collection '{}' was built with {} but the current embedder is '{}' ({} dimensions); \
                 re-ingest or set vector_store.on_embedding_mismatch = \"reset\"",
                self.table_name,
                built_with,
                self.embedder.model_id(),
                self.dimension
            ))),
            MismatchPolicy::Reset => {
                warn!(
                    "Collection '{}' was built with {}, resetting {} entries for '{}'",
                    self.table_name,
                    built_with,
                    rows,
                    self.embedder.model_id()
                );
                self.drop_table_if_exists().await?;
                self.create_table().await?;
                self.write_manifest()
            }
        }
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn create_table(&self) -> Result<()> {
        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn read_manifest(&self) -> Result<Option<CollectionManifest>> {
        if !self.manifest_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.manifest_path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| RagError::Database(format!("Invalid collection manifest: {}", e)))
    }

    fn write_manifest(&self) -> Result<()> {
        let manifest = CollectionManifest::new(self.embedder.model_id(), self.dimension);
        let content = serde_json::to_string_pretty(&manifest)
            .map_err(|e| RagError::Database(format!("Failed to serialize manifest: {}", e)))?;
        std::fs::write(&self.manifest_path, content)?;
        Ok(())
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, true),
            Field::new("chunk_index", DataType::Int64, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Embed and store chunks, returning how many were written
    ///
    /// Ids are `doc_<n>` with `n` continuing from the current collection size.
    #[inline]
    pub async fn add_documents(&mut self, chunks: &[DocumentChunk]) -> Result<usize> {
        if chunks.is_empty() {
            debug!("No chunks to store");
            return Ok(0);
        }

        let table = self.open_table().await?;
        let mut next_id = self.count().await?;
        let mut stored = 0;

        for batch in chunks.chunks(self.batch_size) {
            if let Err(e) = self.append_batch(&table, batch, next_id).await {
                if stored == 0 {
                    return Err(e);
                }
                warn!(
                    "Batch failed after {} chunks were committed to '{}': {}",
                    stored, self.table_name, e
                );
                return Err(RagError::PartialInsert {
                    stored,
                    source: Box::new(e),
                });
            }

            next_id += batch.len();
            stored += batch.len();
            debug!("Committed batch of {} chunks", batch.len());
        }

        info!(
            "Stored {} chunks in collection '{}'",
            stored, self.table_name
        );
        Ok(stored)
    }

    /// Embed one batch and commit it as a single append
    async fn append_batch(
        &self,
        table: &lancedb::Table,
        batch: &[DocumentChunk],
        first_id: usize,
    ) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }

        let record_batch = self.create_record_batch(batch, &embeddings, first_id)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;
        Ok(())
    }

    /// Create a RecordBatch from chunks and their embeddings
    fn create_record_batch(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
        first_id: usize,
    ) -> Result<RecordBatch> {
        let len = chunks.len();

        let mut ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut topics = Vec::with_capacity(len);
        let mut sections = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let created_at = chrono::Utc::now().to_rfc3339();

        for (offset, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            if embedding.len() != self.dimension {
                return Err(RagError::Embedding(format!(
                    "Embedding has {} dimensions, collection '{}' requires {}",
                    embedding.len(),
                    self.table_name,
                    self.dimension
                )));
            }

            ids.push(format!("doc_{}", first_id + offset));
            texts.push(chunk.text.as_str());
            sources.push(chunk.source.as_str());
            topics.push(chunk.topic.as_str());
            sections.push(chunk.section());
            chunk_indices.push(chunk.chunk_index());
            metadata.push(serde_json::to_string(&chunk.metadata).map_err(|e| {
                RagError::Database(format!("Failed to serialize chunk metadata: {}", e))
            })?);
            flat_values.extend_from_slice(embedding);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(topics)),
            Arc::new(StringArray::from(sections)),
            Arc::new(Int64Array::from(chunk_indices)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest-neighbour search, most similar first
    ///
    /// Filters are exact matches on `source`/`topic`. An empty collection or a
    /// filter matching fewer than `top_k` entries yields fewer results.
    #[inline]
    pub async fn query(
        &self,
        query_text: &str,
        top_k: usize,
        filter_source: Option<&str>,
        filter_topic: Option<&str>,
    ) -> Result<Vec<QueryHit>> {
        if top_k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Querying '{}' (top_k={}, source={:?}, topic={:?})",
            self.table_name, top_k, filter_source, filter_topic
        );

        let query_vector = self.embedder.embed_one(query_text).await?;
        let table = self.open_table().await?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(top_k);

        let predicates: Vec<String> = [("source", filter_source), ("topic", filter_topic)]
            .into_iter()
            .filter_map(|(column, value)| {
                value.map(|v| format!("{} = '{}'", column, escape_literal(v)))
            })
            .collect();
        if !predicates.is_empty() {
            query = query.only_if(predicates.join(" AND "));
        }

        let results = query
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Self::parse_hits_stream(results).await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);

        debug!("Query returned {} hits", hits.len());
        Ok(hits)
    }

    async fn parse_hits_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<QueryHit>> {
        let mut hits = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let texts = string_column(&batch, "text")?;
            let sources = string_column(&batch, "source")?;
            let topics = string_column(&batch, "topic")?;
            let sections = string_column(&batch, "section")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

            for row in 0..batch.num_rows() {
                hits.push(QueryHit {
                    text: texts.value(row).to_string(),
                    source: sources.value(row).to_string(),
                    topic: topics.value(row).to_string(),
                    section: (!sections.is_null(row)).then(|| sections.value(row).to_string()),
                    distance: distances
                        .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
                });
            }
        }

        Ok(hits)
    }

    /// Destroy every entry and recreate the empty collection under the same name
    ///
    /// Irreversible; callers confirm before invoking it.
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        warn!("Clearing collection '{}'", self.table_name);

        self.drop_table_if_exists().await?;
        self.create_table().await?;
        self.write_manifest()?;

        info!("Collection '{}' cleared", self.table_name);
        Ok(())
    }

    /// Count entries and list distinct sources and topics
    ///
    /// Scans every row's metadata; meant for maintenance, not request paths.
    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        let total_documents = self.count().await?;
        let mut stats = IndexStats {
            total_documents,
            ..IndexStats::default()
        };

        if total_documents == 0 {
            return Ok(stats);
        }

        let mut results = self
            .open_table()
            .await?
            .query()
            .select(Select::columns(&["source", "topic"]))
            .limit(total_documents)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan metadata: {}", e)))?;

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read metadata stream: {}", e)))?
        {
            let sources = string_column(&batch, "source")?;
            let topics = string_column(&batch, "topic")?;
            for row in 0..batch.num_rows() {
                stats.sources.insert(sources.value(row).to_string());
                stats.topics.insert(topics.value(row).to_string());
            }
        }

        Ok(stats)
    }

    /// Get the total number of stored entries
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count)
    }

    /// Drop the collection table if it exists
    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection table '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

/// Escape a value for use inside a single-quoted SQL literal
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
