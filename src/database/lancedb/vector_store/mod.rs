#[cfg(test)]
mod tests;

use super::ChunkRecord;
use crate::RagError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the table holding chunk embeddings
pub const TABLE_NAME: &str = "chunks";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Option<Connection>,
    table_name: String,
    path: PathBuf,
    vector_dimension: Option<usize>,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("path", &self.path)
            .field("connected", &self.connection.is_some())
            .field("vector_dimension", &self.vector_dimension)
            .finish()
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub source: String,
    pub metadata: Map<String, Value>,
    pub chunk_index: u32,
    /// The stored embedding, used for diversity re-ranking
    pub vector: Vec<f32>,
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Create a fresh index under `dir`, replacing any table a previous run left behind
    ///
    /// # Arguments
    /// * `dir` - Directory that holds the LanceDB dataset
    ///
    /// # Returns
    /// * `Result<Self, RagError>` - Writable store with an empty `chunks` table slot
    #[inline]
    pub async fn create(dir: &Path) -> Result<Self, RagError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let connection = Self::connect(dir).await?;
        let store = Self {
            connection: Some(connection),
            table_name: TABLE_NAME.to_string(),
            path: dir.to_path_buf(),
            vector_dimension: None,
        };

        store.drop_table_if_exists().await?;
        info!("Vector store created at {}", dir.display());
        Ok(store)
    }

    /// Open an existing index for reading. Never creates anything on disk.
    ///
    /// A missing directory yields a store whose searches return nothing.
    #[inline]
    pub async fn open(dir: &Path) -> Result<Self, RagError> {
        let connection = if dir.exists() {
            Some(Self::connect(dir).await?)
        } else {
            warn!(
                "Vector database directory {} does not exist; retrieval will return no documents",
                dir.display()
            );
            None
        };

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            path: dir.to_path_buf(),
            vector_dimension: None,
        };

        if store.table_exists().await? {
            store.vector_dimension = Some(store.detect_existing_vector_dimension().await?);
            debug!(
                "Opened vector store at {} with dimension {:?}",
                dir.display(),
                store.vector_dimension
            );
        } else if store.connection.is_some() {
            warn!(
                "Table '{}' not found in {}; retrieval will return no documents",
                store.table_name,
                dir.display()
            );
        }

        Ok(store)
    }

    /// Relative directories are resolved against the working directory first;
    /// a `file://` URI built from a relative path would point at the filesystem root.
    async fn connect(dir: &Path) -> Result<Connection, RagError> {
        let absolute = std::path::absolute(dir).map_err(|e| {
            RagError::Database(format!(
                "Failed to resolve vector database path {}: {}",
                dir.display(),
                e
            ))
        })?;
        let uri = absolute.to_str().ok_or_else(|| {
            RagError::Database(format!(
                "Vector database path is not valid UTF-8: {}",
                absolute.display()
            ))
        })?;
        debug!("Connecting to LanceDB at {}", uri);

        lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool, RagError> {
        let Some(connection) = &self.connection else {
            return Ok(false);
        };

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, RagError> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|e| {
                        RagError::Database(format!("Invalid vector dimension: {}", e))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    async fn open_table(&self) -> Result<lancedb::Table, RagError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| RagError::Database("Vector store is not connected".to_string()))?;

        connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Store records, creating the table from the first batch's vector dimension
    ///
    /// # Arguments
    /// * `records` - Embedded chunks to store
    ///
    /// # Returns
    /// * `Result<(), RagError>` - Success or error
    #[inline]
    pub async fn add(&mut self, records: &[ChunkRecord]) -> Result<(), RagError> {
        let Some(first) = records.first() else {
            debug!("No records to store");
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(RagError::Database(
                "Cannot store empty embedding vectors".to_string(),
            ));
        }

        match self.vector_dimension {
            Some(existing) if existing != vector_dim => {
                return Err(RagError::Database(format!(
                    "Vector dimension mismatch: table has {}, records have {}",
                    existing, vector_dim
                )));
            }
            Some(_) => {}
            None => {
                self.create_table(vector_dim).await?;
                self.vector_dimension = Some(vector_dim);
            }
        }

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} records", records.len());
        Ok(())
    }

    async fn create_table(&self, vector_dim: usize) -> Result<(), RagError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| RagError::Database("Vector store is not connected".to_string()))?;

        let schema = Self::create_schema(Self::arrow_dimension(vector_dim)?);
        connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Created table '{}' with {} dimensions",
            self.table_name, vector_dim
        );
        Ok(())
    }

    fn arrow_dimension(vector_dim: usize) -> Result<i32, RagError> {
        i32::try_from(vector_dim)
            .map_err(|e| RagError::Database(format!("Vector dimension too large: {}", e)))
    }

    /// Create a RecordBatch from chunk records
    fn create_record_batch(
        records: &[ChunkRecord],
        vector_dim: usize,
    ) -> Result<RecordBatch, RagError> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            if record.vector.len() != vector_dim {
                return Err(RagError::Database(format!(
                    "Record {} has {} dimensions, expected {}",
                    record.id,
                    record.vector.len(),
                    vector_dim
                )));
            }
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.content.as_str());
            sources.push(record.source.as_str());
            metadata.push(
                serde_json::to_string(&record.metadata)
                    .map_err(|e| RagError::Database(format!("Failed to encode metadata: {}", e)))?,
            );
            chunk_indices.push(record.chunk_index);
            created_ats.push(record.created_at.as_str());
        }

        let arrow_dim = Self::arrow_dimension(vector_dim)?;
        let schema = Self::create_schema(arrow_dim);

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, arrow_dim, Arc::new(values_array), None).map_err(
                |e| RagError::Database(format!("Failed to create vector array: {}", e)),
            )?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Search for the `limit` chunks nearest to `query_vector` by cosine distance
    ///
    /// # Returns
    /// * `Result<Vec<SearchResult>, RagError>` - Results ordered by descending similarity
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        if limit == 0 || !self.table_exists().await? {
            debug!("Vector store is empty, returning no results");
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);
        let table = self.open_table().await?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut parsed = Self::parse_search_results_stream(results).await?;
        parsed.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(parsed)
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, RagError> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, RagError> {
        let contents = Self::string_column(batch, "content")?;
        let sources = Self::string_column(batch, "source")?;
        let metadata_json = Self::string_column(batch, "metadata")?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| RagError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid chunk_index column type".to_string()))?;

        let vectors = batch
            .column_by_name("vector")
            .ok_or_else(|| RagError::Database("Missing vector column".to_string()))?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| RagError::Database("Invalid vector column type".to_string()))?;

        // Extract distance scores if available
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let vector_values = vectors.value(row);
            let vector = vector_values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            let metadata = serde_json::from_str(metadata_json.value(row)).unwrap_or_else(|e| {
                warn!("Ignoring unreadable metadata on row {}: {}", row, e);
                Map::new()
            });

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                metadata,
                chunk_index: chunk_indices.value(row),
                vector,
                // Cosine distance is 1 - cosine similarity
                similarity_score: 1.0 - distance,
                distance,
            });
        }

        Ok(search_results)
    }

    /// Get the total number of records stored
    #[inline]
    pub async fn count(&self) -> Result<usize, RagError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Drop the chunks table if it exists
    async fn drop_table_if_exists(&self) -> Result<(), RagError> {
        let Some(connection) = &self.connection else {
            return Ok(());
        };

        if self.table_exists().await? {
            info!("Dropping existing '{}' table", self.table_name);
            connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}
