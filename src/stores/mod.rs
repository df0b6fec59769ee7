//! Batched idempotent upsert of vector records into a namespaced collection.
//!
//! Record identifiers are derived from `(parent_id, chunk_index)`, so
//! re-submitting the same records overwrites identical values instead of
//! creating duplicates. A batch failure aborts the remaining batches; the
//! already-committed count is reported and nothing is rolled back (upsert is
//! a safe retry point).

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::embedding::EmbeddingRecord;
use crate::progress::{ProgressSender, SyncEvent};
use crate::types::SyncError;

pub use http::HttpVectorIndex;

/// Default store batch limit.
pub const INDEX_BATCH_SIZE: usize = 100;

/// One record as the vector store accepts it: id, vector, flat metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Map<String, Value>,
}

impl VectorRecord {
    /// Builds the store representation of an embedded chunk. Metadata is
    /// flattened because the store only accepts scalar values.
    pub fn from_embedding(record: &EmbeddingRecord) -> Self {
        let chunk = &record.chunk;
        let mut metadata = serde_json::Map::new();
        metadata.insert("parent_id".into(), Value::from(chunk.parent_id.clone()));
        metadata.insert("chunk_index".into(), Value::from(chunk.chunk_index as u64));
        metadata.insert("total_chunks".into(), Value::from(chunk.total_chunks as u64));
        metadata.insert("text".into(), Value::from(chunk.text.clone()));
        metadata.insert("title".into(), Value::from(chunk.title.clone()));
        metadata.insert("kind".into(), Value::from(chunk.kind.to_string()));
        metadata.insert(
            "last_modified".into(),
            Value::from(chunk.last_modified.to_rfc3339()),
        );
        if let Some(url) = &chunk.url {
            metadata.insert("url".into(), Value::from(url.clone()));
        }
        if let Some(summary) = &chunk.summary {
            metadata.insert("summary".into(), Value::from(summary.clone()));
        }
        Self {
            id: record.id(),
            values: record.vector.clone(),
            metadata: flatten_metadata(metadata),
        }
    }
}

/// Stringifies any nested metadata value; the store does not support
/// non-scalar metadata natively.
pub fn flatten_metadata(
    metadata: serde_json::Map<String, Value>,
) -> serde_json::Map<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                scalar @ (Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null) => {
                    scalar
                }
                nested => Value::from(nested.to_string()),
            };
            (key, value)
        })
        .collect()
}

/// Wire-level batch upsert into a namespaced collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert_batch(
        &self,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), SyncError>;
}

/// Drives fixed-size upsert batches sequentially, tracking the committed
/// count so a mid-run failure reports exactly what is already visible.
#[derive(Clone, Debug)]
pub struct IndexingStage {
    batch_size: usize,
}

impl Default for IndexingStage {
    fn default() -> Self {
        Self {
            batch_size: INDEX_BATCH_SIZE,
        }
    }
}

impl IndexingStage {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Upserts all records; returns the inserted count.
    pub async fn run(
        &self,
        index: &dyn VectorIndex,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
        progress: &ProgressSender,
    ) -> Result<usize, SyncError> {
        let mut committed = 0usize;
        for batch in records.chunks(self.batch_size) {
            index
                .upsert_batch(collection, namespace, batch)
                .await
                .map_err(|err| {
                    let message = match err {
                        SyncError::Indexing { message, .. } => message,
                        other => other.to_string(),
                    };
                    SyncError::Indexing { committed, message }
                })?;
            committed += batch.len();
            debug!(collection, namespace, committed, total = records.len(), "upserted batch");
            progress.emit(SyncEvent::RecordsIndexed {
                processed: committed,
                total: records.len(),
            });
        }
        Ok(committed)
    }
}
