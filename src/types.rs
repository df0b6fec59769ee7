//! Shared error taxonomy for the sync pipeline.
//!
//! Every stage returns an explicit [`SyncError`] rather than panicking or
//! relying on a catch-all error type. The orchestrator stops at the first
//! failure and surfaces the error code through [`SyncError::code`].

use thiserror::Error;

/// Errors that can occur anywhere in the sync pipeline.
///
/// Each variant corresponds to one failure class with its own stable code,
/// so callers can branch on [`SyncError::code`] without string matching on
/// messages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Required configuration or credentials are missing or malformed.
    /// Raised before any network call is made.
    #[error("missing required configuration: {0}")]
    Configuration(String),

    /// The content source yielded zero documents. An empty sync is never
    /// intentional, so this is terminal for the run.
    #[error("no documents found for source '{0}'")]
    NoDocumentsFound(String),

    /// Source fetch, formatting, chunking, or summarization failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Embedding provider call failed or returned a malformed vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector store upsert failed. Batches committed before the failure
    /// remain valid and visible; `committed` reports how many records made
    /// it in before the run aborted.
    #[error("indexing failed after {committed} records: {message}")]
    Indexing { committed: usize, message: String },

    /// The fingerprint cache store was unreachable or misbehaved. Surfaced
    /// rather than treated as a miss so an infrastructure outage never
    /// masquerades as a cold start.
    #[error("fingerprint cache unavailable: {0}")]
    Cache(String),
}

impl SyncError {
    /// Stable machine-readable code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Configuration(_) => "CONFIG_ERROR",
            SyncError::NoDocumentsFound(_) => "NO_DOCUMENTS_FOUND",
            SyncError::Extraction(_) => "EXTRACTION_ERROR",
            SyncError::Embedding(_) => "EMBEDDING_ERROR",
            SyncError::Indexing { .. } => "INDEXING_ERROR",
            SyncError::Cache(_) => "CACHE_ERROR",
        }
    }

    /// Convenience constructor for configuration failures.
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration(message.into())
    }

    /// Convenience constructor for extraction failures.
    pub fn extraction(message: impl Into<String>) -> Self {
        SyncError::Extraction(message.into())
    }

    /// Convenience constructor for embedding failures.
    pub fn embedding(message: impl Into<String>) -> Self {
        SyncError::Embedding(message.into())
    }

    /// Convenience constructor for cache failures.
    pub fn cache(message: impl Into<String>) -> Self {
        SyncError::Cache(message.into())
    }
}
