//! Sync orchestrator: drives the stages in order and aggregates statistics.
//!
//! A single run moves through
//! `Idle → Validating → Loading → ResolvingCache → Embedding → Indexing →
//! Done | Failed`, strictly sequentially. The orchestrator owns every
//! in-flight collection for the run and stops at the first failure; nothing
//! is retried here. Retry policy, if desired, belongs to the caller
//! re-invoking the whole pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::{Chunk, TextChunker};
use crate::config::SyncConfig;
use crate::embedding::{Embedder, EmbeddingStage};
use crate::ingestion::cache::DEFAULT_TTL;
use crate::ingestion::{FingerprintCache, SourceLoader, Summarizer};
use crate::progress::{ProgressSender, SyncEvent};
use crate::stores::{IndexingStage, VectorIndex, VectorRecord};
use crate::types::SyncError;

/// Pipeline stage, reported through [`SyncEvent::StageStarted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStage {
    Idle,
    Validating,
    Loading,
    ResolvingCache,
    Embedding,
    Indexing,
    Done,
    Failed,
}

/// Run-level summary, produced once per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_docs: usize,
    /// Documents whose chunks were served from the fingerprint cache.
    pub cached_docs: usize,
    /// Documents chunked (and optionally summarized) fresh this run.
    pub processed_docs: usize,
    pub total_chunks: usize,
    /// Chunks that were embedded and indexed this run.
    pub new_chunks: usize,
    /// Records committed to the vector store this run.
    pub indexed: usize,
}

/// Structured result of one run: the sole success/failure channel.
#[derive(Debug)]
pub struct SyncReport {
    pub outcome: Result<SyncStats, SyncError>,
    pub namespace: String,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn stats(&self) -> Option<&SyncStats> {
        self.outcome.as_ref().ok()
    }

    pub fn error_code(&self) -> Option<&'static str> {
        self.outcome.as_ref().err().map(SyncError::code)
    }
}

/// Single-use pipeline driver; construct one per run via [`builder`].
///
/// [`builder`]: SyncOrchestrator::builder
pub struct SyncOrchestrator {
    config: SyncConfig,
    loader: Arc<dyn SourceLoader>,
    cache: Arc<dyn FingerprintCache>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    summarizer: Option<Arc<dyn Summarizer>>,
    chunker: TextChunker,
    embedding_stage: EmbeddingStage,
    indexing_stage: IndexingStage,
    cache_ttl: Duration,
    progress: ProgressSender,
    stage: SyncStage,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("cache_ttl", &self.cache_ttl)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::default()
    }

    /// Runs the pipeline to completion and converts the outcome into a
    /// structured report with elapsed duration.
    pub async fn run(mut self) -> SyncReport {
        let namespace = self.config.namespace.clone();
        let started = Instant::now();
        let outcome = self.execute().await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(stats) => {
                info!(
                    namespace,
                    total_docs = stats.total_docs,
                    cached_docs = stats.cached_docs,
                    new_chunks = stats.new_chunks,
                    indexed = stats.indexed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "sync complete"
                );
            }
            Err(err) => {
                self.stage = SyncStage::Failed;
                self.progress.emit(SyncEvent::Failed {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                warn!(namespace, code = err.code(), error = %err, "sync failed");
            }
        }

        SyncReport {
            outcome,
            namespace,
            elapsed,
        }
    }

    async fn execute(&mut self) -> Result<SyncStats, SyncError> {
        self.transition(SyncStage::Validating);
        self.config.validate()?;

        self.transition(SyncStage::Loading);
        let documents = self
            .loader
            .load(&self.config.source_id, self.config.kind, &self.progress)
            .await?;
        if documents.is_empty() {
            return Err(SyncError::NoDocumentsFound(self.config.source_id.clone()));
        }

        self.transition(SyncStage::ResolvingCache);
        let mut stats = SyncStats {
            total_docs: documents.len(),
            ..SyncStats::default()
        };
        let mut new_chunks: Vec<Chunk> = Vec::new();

        for document in &documents {
            let fingerprint = document.fingerprint();
            match self.cache.get(&fingerprint).await? {
                Some(chunks) => {
                    stats.cached_docs += 1;
                    stats.total_chunks += chunks.len();
                    self.progress.emit(SyncEvent::DocumentResolved {
                        id: document.id.clone(),
                        cached: true,
                        chunks: chunks.len(),
                    });
                }
                None => {
                    let mut chunks = self.chunker.split(document)?;
                    if let (Some(summarizer), Some(prompt)) =
                        (&self.summarizer, &self.config.summarization_prompt)
                    {
                        for chunk in &mut chunks {
                            chunk.summary = Some(summarizer.summarize(&chunk.text, prompt).await?);
                        }
                    }
                    self.cache.set(&fingerprint, &chunks, self.cache_ttl).await?;
                    stats.processed_docs += 1;
                    stats.total_chunks += chunks.len();
                    self.progress.emit(SyncEvent::DocumentResolved {
                        id: document.id.clone(),
                        cached: false,
                        chunks: chunks.len(),
                    });
                    new_chunks.extend(chunks);
                }
            }
        }
        stats.new_chunks = new_chunks.len();

        if new_chunks.is_empty() {
            // Nothing changed since the last run: skip both provider calls.
            info!("all chunks served from cache; skipping embedding and indexing");
            self.transition(SyncStage::Done);
            self.progress.emit(SyncEvent::Completed { stats });
            return Ok(stats);
        }

        self.transition(SyncStage::Embedding);
        let embedded = self
            .embedding_stage
            .run(self.embedder.as_ref(), &new_chunks, &self.progress)
            .await?;

        self.transition(SyncStage::Indexing);
        let records: Vec<VectorRecord> = embedded.iter().map(VectorRecord::from_embedding).collect();
        stats.indexed = self
            .indexing_stage
            .run(
                self.index.as_ref(),
                &self.config.collection_name,
                &self.config.namespace,
                &records,
                &self.progress,
            )
            .await?;

        self.transition(SyncStage::Done);
        self.progress.emit(SyncEvent::Completed { stats });
        Ok(stats)
    }

    fn transition(&mut self, stage: SyncStage) {
        self.stage = stage;
        self.progress.emit(SyncEvent::StageStarted { stage });
    }
}

/// Builder collecting the collaborators for one run.
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    config: Option<SyncConfig>,
    loader: Option<Arc<dyn SourceLoader>>,
    cache: Option<Arc<dyn FingerprintCache>>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    chunker: Option<TextChunker>,
    embedding_stage: Option<EmbeddingStage>,
    indexing_stage: Option<IndexingStage>,
    cache_ttl: Option<Duration>,
    progress: Option<ProgressSender>,
}

impl SyncOrchestratorBuilder {
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn FingerprintCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    #[must_use]
    pub fn chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = Some(chunker);
        self
    }

    #[must_use]
    pub fn embedding_stage(mut self, stage: EmbeddingStage) -> Self {
        self.embedding_stage = Some(stage);
        self
    }

    #[must_use]
    pub fn indexing_stage(mut self, stage: IndexingStage) -> Self {
        self.indexing_stage = Some(stage);
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<SyncOrchestrator, SyncError> {
        let config = self
            .config
            .ok_or_else(|| SyncError::configuration("orchestrator requires a config"))?;
        let loader = self
            .loader
            .ok_or_else(|| SyncError::configuration("orchestrator requires a source loader"))?;
        let cache = self
            .cache
            .ok_or_else(|| SyncError::configuration("orchestrator requires a fingerprint cache"))?;
        let embedder = self
            .embedder
            .ok_or_else(|| SyncError::configuration("orchestrator requires an embedder"))?;
        let index = self
            .index
            .ok_or_else(|| SyncError::configuration("orchestrator requires a vector index"))?;
        if config.summarization_prompt.is_some() && self.summarizer.is_none() {
            return Err(SyncError::configuration(
                "summarization_prompt is set but no summarizer collaborator was provided",
            ));
        }
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => TextChunker::new()?,
        };
        Ok(SyncOrchestrator {
            config,
            loader,
            cache,
            embedder,
            index,
            summarizer: self.summarizer,
            chunker,
            embedding_stage: self.embedding_stage.unwrap_or_default(),
            indexing_stage: self.indexing_stage.unwrap_or_default(),
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_TTL),
            progress: self.progress.unwrap_or_else(ProgressSender::disabled),
            stage: SyncStage::Idle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentContent, SourceDocument, SourceKind};
    use crate::embedding::MockEmbedder;
    use crate::ingestion::InMemoryFingerprintCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StaticLoader {
        documents: Vec<SourceDocument>,
        called: AtomicBool,
    }

    impl StaticLoader {
        fn new(documents: Vec<SourceDocument>) -> Self {
            Self {
                documents,
                called: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SourceLoader for StaticLoader {
        async fn load(
            &self,
            _source_id: &str,
            _kind: SourceKind,
            progress: &ProgressSender,
        ) -> Result<Vec<SourceDocument>, SyncError> {
            self.called.store(true, Ordering::SeqCst);
            let total = self.documents.len();
            for (i, doc) in self.documents.iter().enumerate() {
                progress.emit(SyncEvent::DocumentLoaded {
                    current: i + 1,
                    total,
                    title: doc.title.clone(),
                });
            }
            Ok(self.documents.clone())
        }
    }

    #[derive(Default)]
    struct CountingIndex {
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for CountingIndex {
        async fn upsert_batch(
            &self,
            _collection: &str,
            _namespace: &str,
            records: &[VectorRecord],
        ) -> Result<(), SyncError> {
            self.upserts.fetch_add(records.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn page_doc(text: &str) -> SourceDocument {
        SourceDocument {
            id: "page-1".into(),
            kind: SourceKind::Page,
            last_modified: chrono::Utc::now(),
            title: "Page".into(),
            content: DocumentContent::Text(text.into()),
            url: None,
        }
    }

    fn builder_with(loader: Arc<dyn SourceLoader>) -> SyncOrchestratorBuilder {
        SyncOrchestrator::builder()
            .config(SyncConfig::new(
                "page-1",
                SourceKind::Page,
                "kb",
                "test-ns",
            ))
            .loader(loader)
            .cache(Arc::new(InMemoryFingerprintCache::new()))
            .embedder(Arc::new(MockEmbedder::default()))
            .index(Arc::new(CountingIndex::default()))
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_loading() {
        let loader = Arc::new(StaticLoader::new(vec![page_doc("hello world")]));
        let report = builder_with(loader.clone())
            .config(SyncConfig::new("", SourceKind::Page, "kb", "ns"))
            .build()
            .unwrap()
            .run()
            .await;

        assert_eq!(report.error_code(), Some("CONFIG_ERROR"));
        assert!(!loader.called.load(Ordering::SeqCst), "no network calls expected");
    }

    #[tokio::test]
    async fn zero_documents_is_a_distinct_failure() {
        let loader = Arc::new(StaticLoader::new(Vec::new()));
        let report = builder_with(loader).build().unwrap().run().await;
        assert_eq!(report.error_code(), Some("NO_DOCUMENTS_FOUND"));
    }

    #[tokio::test]
    async fn successful_run_reports_stats_and_stages() {
        let loader = Arc::new(StaticLoader::new(vec![page_doc("hello world")]));
        let (progress, events) = ProgressSender::channel();
        let report = builder_with(loader)
            .progress(progress)
            .build()
            .unwrap()
            .run()
            .await;

        let stats = report.stats().expect("run should succeed");
        assert_eq!(stats.total_docs, 1);
        assert_eq!(stats.processed_docs, 1);
        assert_eq!(stats.new_chunks, 1);
        assert_eq!(stats.indexed, 1);

        let stages: Vec<SyncStage> = events
            .drain()
            .filter_map(|event| match event {
                SyncEvent::StageStarted { stage } => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                SyncStage::Validating,
                SyncStage::Loading,
                SyncStage::ResolvingCache,
                SyncStage::Embedding,
                SyncStage::Indexing,
                SyncStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn missing_summarizer_with_prompt_is_rejected_at_build() {
        let loader = Arc::new(StaticLoader::new(vec![page_doc("hello")]));
        let err = builder_with(loader)
            .config(
                SyncConfig::new("page-1", SourceKind::Page, "kb", "ns")
                    .with_summarization_prompt("Summarize {text}"),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
