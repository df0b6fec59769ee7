//! Source document model and change-detection fingerprints.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The shape of a document as delivered by the content source.
///
/// The two kinds drive different formatting strategies at chunk-input time:
/// a page is free text that needs markup stripped, a collection record is a
/// structured property map rendered into `key: value` lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Page,
    CollectionRecord,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Page => write!(f, "page"),
            SourceKind::CollectionRecord => write!(f, "collection-record"),
        }
    }
}

/// Raw content of a source document.
///
/// Property maps keep the order the source delivered them in; rendering
/// depends on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentContent {
    Text(String),
    Properties(serde_json::Map<String, serde_json::Value>),
}

/// One unit fetched from the content source.
///
/// Created transiently per pipeline run by the source loader and never
/// persisted directly; only the derived chunks outlive the run (via the
/// fingerprint cache and the vector store).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable identifier assigned by the content source.
    pub id: String,
    pub kind: SourceKind,
    pub last_modified: DateTime<Utc>,
    pub title: String,
    pub content: DocumentContent,
    pub url: Option<String>,
}

impl SourceDocument {
    /// Fingerprint for this document's current revision.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.id, self.last_modified)
    }
}

/// Deterministic cache key derived from a document's identity and
/// modification time.
///
/// Equal fingerprints imply equal chunk output for a fixed chunker
/// configuration: the modification timestamp changes whenever the content
/// does, so a matching fingerprint means the cached chunks are still valid.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(id: &str, last_modified: DateTime<Utc>) -> Self {
        Fingerprint(format!("{id}@{}", last_modified.to_rfc3339()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the stable identifier for a chunk from its position.
///
/// Position-derived (not content-hashed) so that re-running the pipeline
/// over unchanged content upserts the same ids, making indexing idempotent.
pub fn chunk_id(parent_id: &str, chunk_index: usize) -> String {
    format!("{parent_id}_chunk_{chunk_index}")
}
