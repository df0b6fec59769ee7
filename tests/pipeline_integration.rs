//! End-to-end pipeline runs against in-process collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use vecsync::{
    DocumentContent, FingerprintCache, InMemoryFingerprintCache, MockEmbedder, ProgressSender,
    SourceDocument, SourceKind, SourceLoader, Summarizer, SyncConfig, SyncError, SyncEvent,
    SyncOrchestrator, VectorIndex, VectorRecord,
};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Twelve ~190-unit paragraphs: splits into exactly three default chunks.
fn prose_document() -> SourceDocument {
    let paragraph = "lorem ipsum ".repeat(16);
    SourceDocument {
        id: "doc-a".into(),
        kind: SourceKind::Page,
        last_modified: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        title: "Long Page".into(),
        content: DocumentContent::Text(vec![paragraph; 12].join("\n\n")),
        url: Some("https://source.example/doc-a".into()),
    }
}

/// Small property map: renders to a single chunk.
fn record_document() -> SourceDocument {
    let mut properties = serde_json::Map::new();
    properties.insert("Name".into(), serde_json::json!("Widget"));
    properties.insert("Status".into(), serde_json::json!("active"));
    properties.insert("Tags".into(), serde_json::json!(["alpha", "beta"]));
    properties.insert("Count".into(), serde_json::json!(7));
    SourceDocument {
        id: "doc-b".into(),
        kind: SourceKind::CollectionRecord,
        last_modified: Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap(),
        title: "Widget".into(),
        content: DocumentContent::Properties(properties),
        url: None,
    }
}

struct FixtureLoader {
    documents: Mutex<Vec<SourceDocument>>,
}

impl FixtureLoader {
    fn new(documents: Vec<SourceDocument>) -> Self {
        Self {
            documents: Mutex::new(documents),
        }
    }

    fn touch(&self, id: &str, timestamp: chrono::DateTime<Utc>) {
        let mut documents = self.documents.lock();
        let doc = documents
            .iter_mut()
            .find(|doc| doc.id == id)
            .expect("fixture document");
        doc.last_modified = timestamp;
    }
}

#[async_trait]
impl SourceLoader for FixtureLoader {
    async fn load(
        &self,
        _source_id: &str,
        _kind: SourceKind,
        progress: &ProgressSender,
    ) -> Result<Vec<SourceDocument>, SyncError> {
        let documents = self.documents.lock().clone();
        let total = documents.len();
        for (i, doc) in documents.iter().enumerate() {
            progress.emit(SyncEvent::DocumentLoaded {
                current: i + 1,
                total,
                title: doc.title.clone(),
            });
        }
        Ok(documents)
    }
}

#[derive(Default)]
struct RecordingIndex {
    records: Mutex<Vec<VectorRecord>>,
    calls: AtomicUsize,
}

impl RecordingIndex {
    fn ids(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.id.clone()).collect()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert_batch(
        &self,
        _collection: &str,
        _namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records.lock().extend_from_slice(records);
        Ok(())
    }
}

struct UnreachableCache;

#[async_trait]
impl FingerprintCache for UnreachableCache {
    async fn get(
        &self,
        _fingerprint: &vecsync::Fingerprint,
    ) -> Result<Option<Vec<vecsync::Chunk>>, SyncError> {
        Err(SyncError::cache("store unreachable"))
    }

    async fn set(
        &self,
        _fingerprint: &vecsync::Fingerprint,
        _chunks: &[vecsync::Chunk],
        _ttl: std::time::Duration,
    ) -> Result<(), SyncError> {
        Err(SyncError::cache("store unreachable"))
    }

    async fn invalidate(&self, _fingerprint: &vecsync::Fingerprint) -> Result<(), SyncError> {
        Err(SyncError::cache("store unreachable"))
    }
}

struct EchoSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, text: &str, prompt: &str) -> Result<String, SyncError> {
        assert!(prompt.contains("{text}"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        let head: String = text.chars().take(12).collect();
        Ok(format!("summary of: {head}"))
    }
}

struct Fixture {
    loader: Arc<FixtureLoader>,
    cache: Arc<InMemoryFingerprintCache>,
    config: SyncConfig,
}

impl Fixture {
    fn new() -> Self {
        Self {
            loader: Arc::new(FixtureLoader::new(vec![prose_document(), record_document()])),
            cache: Arc::new(InMemoryFingerprintCache::new()),
            config: SyncConfig::new("workspace-1", SourceKind::Page, "knowledge-base", "planets"),
        }
    }

    async fn run(&self) -> (vecsync::SyncReport, Arc<MockEmbedder>, Arc<RecordingIndex>) {
        let embedder = Arc::new(MockEmbedder::default());
        let index = Arc::new(RecordingIndex::default());
        let report = SyncOrchestrator::builder()
            .config(self.config.clone())
            .loader(self.loader.clone())
            .cache(self.cache.clone())
            .embedder(embedder.clone())
            .index(index.clone())
            .build()
            .unwrap()
            .run()
            .await;
        (report, embedder, index)
    }
}

#[tokio::test]
async fn cold_run_chunks_embeds_and_indexes_everything() {
    init_tracing();
    let fixture = Fixture::new();
    let (report, embedder, index) = fixture.run().await;

    let stats = report.stats().expect("cold run should succeed");
    assert_eq!(stats.total_docs, 2);
    assert_eq!(stats.cached_docs, 0);
    assert_eq!(stats.processed_docs, 2);
    assert_eq!(stats.total_chunks, 4);
    assert_eq!(stats.new_chunks, 4);
    assert_eq!(stats.indexed, 4);

    // 4 chunks fit in a single embedding batch and a single upsert batch.
    assert_eq!(embedder.call_count(), 1);
    assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        index.ids(),
        vec![
            "doc-a_chunk_0",
            "doc-a_chunk_1",
            "doc-a_chunk_2",
            "doc-b_chunk_0",
        ]
    );
}

#[tokio::test]
async fn warm_run_makes_zero_provider_calls() {
    let fixture = Fixture::new();
    let (cold, _, _) = fixture.run().await;
    assert!(cold.is_success());

    let (warm, embedder, index) = fixture.run().await;
    let stats = warm.stats().expect("warm run should succeed");
    assert_eq!(stats.total_docs, 2);
    assert_eq!(stats.cached_docs, 2);
    assert_eq!(stats.processed_docs, 0);
    assert_eq!(stats.total_chunks, 4);
    assert_eq!(stats.new_chunks, 0);
    assert_eq!(stats.indexed, 0);

    assert_eq!(embedder.call_count(), 0);
    assert_eq!(index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn touched_document_is_reprocessed_alone() {
    let fixture = Fixture::new();
    let (cold, _, _) = fixture.run().await;
    assert!(cold.is_success());

    fixture.loader.touch(
        "doc-a",
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap(),
    );
    let (run, embedder, index) = fixture.run().await;

    let stats = run.stats().unwrap();
    assert_eq!(stats.cached_docs, 1);
    assert_eq!(stats.processed_docs, 1);
    assert_eq!(stats.new_chunks, 3);
    assert_eq!(stats.indexed, 3);
    assert_eq!(embedder.call_count(), 1);
    assert_eq!(
        index.ids(),
        vec!["doc-a_chunk_0", "doc-a_chunk_1", "doc-a_chunk_2"]
    );
}

#[tokio::test]
async fn indexing_is_idempotent_across_reruns() {
    let fixture = Fixture::new();
    let (_, _, first_index) = fixture.run().await;

    // Force a full recompute of the same unchanged content.
    fixture.cache.invalidate(&prose_document().fingerprint()).await.unwrap();
    fixture.cache.invalidate(&record_document().fingerprint()).await.unwrap();
    let (rerun, _, second_index) = fixture.run().await;

    assert!(rerun.is_success());
    // Same ids as before: the upsert overwrites rather than duplicates.
    assert_eq!(first_index.ids(), second_index.ids());
}

#[tokio::test]
async fn cache_outage_fails_the_run_without_provider_calls() {
    let fixture = Fixture::new();
    let embedder = Arc::new(MockEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let report = SyncOrchestrator::builder()
        .config(fixture.config.clone())
        .loader(fixture.loader.clone())
        .cache(Arc::new(UnreachableCache))
        .embedder(embedder.clone())
        .index(index.clone())
        .build()
        .unwrap()
        .run()
        .await;

    assert_eq!(report.error_code(), Some("CACHE_ERROR"));
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summaries_are_attached_before_caching_and_indexing() {
    let fixture = Fixture::new();
    let summarizer = Arc::new(EchoSummarizer {
        calls: AtomicUsize::new(0),
    });
    let config = fixture
        .config
        .clone()
        .with_summarization_prompt("Summarize the following:\n{text}\nSUMMARY:");

    let index = Arc::new(RecordingIndex::default());
    let report = SyncOrchestrator::builder()
        .config(config.clone())
        .loader(fixture.loader.clone())
        .cache(fixture.cache.clone())
        .embedder(Arc::new(MockEmbedder::default()))
        .index(index.clone())
        .summarizer(summarizer.clone())
        .build()
        .unwrap()
        .run()
        .await;

    assert!(report.is_success());
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 4);
    for record in index.records.lock().iter() {
        let summary = record.metadata["summary"].as_str().unwrap();
        assert!(summary.starts_with("summary of: "));
    }

    // Cached chunks carry their summaries, so a warm run never summarizes.
    let warm_report = SyncOrchestrator::builder()
        .config(config)
        .loader(fixture.loader.clone())
        .cache(fixture.cache.clone())
        .embedder(Arc::new(MockEmbedder::default()))
        .index(Arc::new(RecordingIndex::default()))
        .summarizer(summarizer.clone())
        .build()
        .unwrap()
        .run()
        .await;
    assert!(warm_report.is_success());
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn progress_events_arrive_in_pipeline_order() {
    let fixture = Fixture::new();
    let (progress, events) = ProgressSender::channel();
    let report = SyncOrchestrator::builder()
        .config(fixture.config.clone())
        .loader(fixture.loader.clone())
        .cache(fixture.cache.clone())
        .embedder(Arc::new(MockEmbedder::default()))
        .index(Arc::new(RecordingIndex::default()))
        .progress(progress)
        .build()
        .unwrap()
        .run()
        .await;
    assert!(report.is_success());

    let events: Vec<SyncEvent> = events.drain().collect();
    let loaded = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::DocumentLoaded { .. }))
        .count();
    let resolved = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::DocumentResolved { cached: false, .. }))
        .count();
    assert_eq!(loaded, 2);
    assert_eq!(resolved, 2);
    assert!(matches!(
        events.last(),
        Some(SyncEvent::Completed { stats }) if stats.new_chunks == 4
    ));
}
