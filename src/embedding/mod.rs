//! Embedding of chunk text into fixed-length vectors, batched.
//!
//! Batches are submitted sequentially to bound memory and provider load.
//! Every element of a batch response must carry a recognized dense vector;
//! one malformed element fails the whole batch (and the run) rather than
//! silently dropping a record, because a partially embedded chunk set would
//! break the one-chunk-per-vector invariant downstream.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::chunking::Chunk;
use crate::config::require_credential;
use crate::progress::{ProgressSender, SyncEvent};
use crate::types::SyncError;

/// Default provider batch limit.
pub const EMBED_BATCH_SIZE: usize = 96;

/// A chunk paired with its embedding vector.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    /// Same identifier as the underlying chunk.
    pub fn id(&self) -> String {
        self.chunk.id()
    }
}

/// Wire-level batch call to an embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one batch of texts; the result must be positionally aligned
    /// with the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncError>;

    fn model(&self) -> &str;
}

/// Drives fixed-size batches through an [`Embedder`] sequentially,
/// validating dimensionality stays constant across the whole run.
#[derive(Clone, Debug)]
pub struct EmbeddingStage {
    batch_size: usize,
}

impl Default for EmbeddingStage {
    fn default() -> Self {
        Self {
            batch_size: EMBED_BATCH_SIZE,
        }
    }
}

impl EmbeddingStage {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub async fn run(
        &self,
        embedder: &dyn Embedder,
        chunks: &[Chunk],
        progress: &ProgressSender,
    ) -> Result<Vec<EmbeddingRecord>, SyncError> {
        let mut records = Vec::with_capacity(chunks.len());
        let mut expected_dim: Option<usize> = None;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(SyncError::embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.is_empty() {
                    return Err(SyncError::embedding(format!(
                        "empty vector for chunk {}",
                        chunk.id()
                    )));
                }
                match expected_dim {
                    None => expected_dim = Some(vector.len()),
                    Some(dim) if dim != vector.len() => {
                        return Err(SyncError::embedding(format!(
                            "vector dimension changed mid-run: {} then {}",
                            dim,
                            vector.len()
                        )));
                    }
                    Some(_) => {}
                }
                records.push(EmbeddingRecord {
                    chunk: chunk.clone(),
                    vector,
                });
            }

            debug!(
                model = embedder.model(),
                processed = records.len(),
                total = chunks.len(),
                "embedded batch"
            );
            progress.emit(SyncEvent::ChunksEmbedded {
                processed: records.len(),
                total: chunks.len(),
            });
        }
        Ok(records)
    }
}

/// REST client for an embedding provider with a documented batch limit.
pub struct HttpEmbedder {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let api_key = api_key.into();
        require_credential(&api_key, "embedding provider API key")?;
        let client = Client::builder()
            .user_agent(concat!("vecsync/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| SyncError::embedding(format!("client build failed: {err}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        let endpoint = self
            .base_url
            .join("v1/embed")
            .map_err(|err| SyncError::embedding(format!("invalid endpoint: {err}")))?;
        let request = EmbedRequest {
            model: &self.model,
            texts,
            input_type: "passage",
            truncate: "END",
        };
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| SyncError::embedding(format!("provider call failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::embedding(format!(
                "provider returned {status}: {body}"
            )));
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|err| SyncError::embedding(format!("malformed embed response: {err}")))?;

        payload
            .embeddings
            .into_iter()
            .map(|item| {
                if item.vector_type != "dense" {
                    return Err(SyncError::embedding(format!(
                        "unrecognized vector representation '{}'",
                        item.vector_type
                    )));
                }
                Ok(item.values)
            })
            .collect()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Deterministic in-process embedder for tests and offline runs.
///
/// Vectors are derived from a hash of the input text, so identical text
/// always embeds identically and distinct text almost never collides.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(8)
    }
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of batch calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                let seed = hasher.finish();
                (0..self.dimension)
                    .map(|i| {
                        let byte = (seed.rotate_left(i as u32 * 8) & 0xff) as f32;
                        byte / 255.0
                    })
                    .collect()
            })
            .collect())
    }

    fn model(&self) -> &str {
        "mock-embedder"
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'a str,
    truncate: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<EmbedVector>,
}

#[derive(Deserialize)]
struct EmbedVector {
    vector_type: String,
    values: Vec<f32>,
}
