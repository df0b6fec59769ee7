//! # Vecsync: Incremental Content-to-Vector Sync Pipeline
//!
//! Vecsync extracts documents from a hierarchical content source, splits them
//! into overlap-aware chunks, embeds only what changed, and upserts the
//! resulting records into a namespaced vector store collection.
//!
//! ## Pipeline
//!
//! ```text
//! SourceLoader ──> FingerprintCache ──hit──> (chunks reused, no provider calls)
//!                        │
//!                       miss
//!                        ▼
//!                  TextChunker ──> [Summarizer] ──> cache.set
//!                        │
//!                        ▼
//!                    Embedder (batches of 96)
//!                        │
//!                        ▼
//!                   VectorIndex (batches of 100, idempotent upsert)
//! ```
//!
//! Change detection keys on a `{id}@{last_modified}` fingerprint: a document
//! whose timestamp is unchanged is served from the cache and never reaches
//! the embedding provider. Chunk identifiers are derived from
//! `(parent_id, chunk_index)`, so re-indexing overwrites rather than
//! duplicates.
//!
//! ## Quick Start
//!
//! Collaborators plug in behind traits; the in-memory cache and the
//! deterministic [`MockEmbedder`] make offline runs trivial:
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use vecsync::{
//!     DocumentContent, InMemoryFingerprintCache, MockEmbedder, ProgressSender,
//!     SourceDocument, SourceKind, SourceLoader, SyncConfig, SyncError,
//!     SyncOrchestrator, VectorIndex, VectorRecord,
//! };
//!
//! struct OneDocLoader;
//!
//! #[async_trait]
//! impl SourceLoader for OneDocLoader {
//!     async fn load(
//!         &self,
//!         source_id: &str,
//!         kind: SourceKind,
//!         _progress: &ProgressSender,
//!     ) -> Result<Vec<SourceDocument>, SyncError> {
//!         Ok(vec![SourceDocument {
//!             id: source_id.to_string(),
//!             kind,
//!             last_modified: chrono::Utc::now(),
//!             title: "Greeting".into(),
//!             content: DocumentContent::Text("Hello, vectors!".into()),
//!             url: None,
//!         }])
//!     }
//! }
//!
//! struct NullIndex;
//!
//! #[async_trait]
//! impl VectorIndex for NullIndex {
//!     async fn upsert_batch(
//!         &self,
//!         _collection: &str,
//!         _namespace: &str,
//!         _records: &[VectorRecord],
//!     ) -> Result<(), SyncError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let report = SyncOrchestrator::builder()
//!     .config(SyncConfig::new("doc-1", SourceKind::Page, "kb", "demo"))
//!     .loader(Arc::new(OneDocLoader))
//!     .cache(Arc::new(InMemoryFingerprintCache::new()))
//!     .embedder(Arc::new(MockEmbedder::default()))
//!     .index(Arc::new(NullIndex))
//!     .build()
//!     .unwrap()
//!     .run()
//!     .await;
//!
//! let stats = report.stats().unwrap();
//! assert_eq!(stats.total_docs, 1);
//! assert_eq!(stats.new_chunks, 1);
//! # }
//! ```
//!
//! ## Observability
//!
//! Every stage emits [`SyncEvent`]s through a [`ProgressSender`] channel, and
//! internal spans go through `tracing`; install a subscriber to see them.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod ingestion;
pub mod pipeline;
pub mod progress;
pub mod stores;
pub mod types;

pub use chunking::{Chunk, ChunkerConfig, DocumentFormatter, TextChunker};
pub use config::SyncConfig;
pub use document::{DocumentContent, Fingerprint, SourceDocument, SourceKind, chunk_id};
pub use embedding::{
    EMBED_BATCH_SIZE, Embedder, EmbeddingRecord, EmbeddingStage, HttpEmbedder, MockEmbedder,
};
pub use ingestion::{
    DEFAULT_SUMMARY_PROMPT, DEFAULT_TTL, FingerprintCache, HttpSourceLoader, HttpSummarizer,
    InMemoryFingerprintCache, RedisFingerprintCache, SourceLoader, Summarizer,
};
pub use pipeline::{SyncOrchestrator, SyncOrchestratorBuilder, SyncReport, SyncStage, SyncStats};
pub use progress::{ProgressSender, SyncEvent};
pub use stores::{
    HttpVectorIndex, INDEX_BATCH_SIZE, IndexingStage, VectorIndex, VectorRecord, flatten_metadata,
};
pub use types::SyncError;
