//! Run configuration, validated once at orchestrator entry.
//!
//! The original system re-derived document configuration ad hoc at many call
//! sites; here it is a single explicit value with required fields, checked
//! before any network call. Credentials are passed into each collaborator's
//! constructor instead of living in process-wide state, and the core never
//! reads environment variables.

use serde::{Deserialize, Serialize};

use crate::document::SourceKind;
use crate::types::SyncError;

/// Which logical document to sync and where its vectors land.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Identifier of the page or collection at the content source.
    pub source_id: String,
    pub kind: SourceKind,
    /// Vector store collection receiving the records.
    pub collection_name: String,
    /// Logical partition within the collection isolating this document set.
    pub namespace: String,
    /// When set, each freshly chunked document gets a per-chunk summary
    /// generated with this prompt before caching.
    pub summarization_prompt: Option<String>,
}

impl SyncConfig {
    pub fn new(
        source_id: impl Into<String>,
        kind: SourceKind,
        collection_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            collection_name: collection_name.into(),
            namespace: namespace.into(),
            summarization_prompt: None,
        }
    }

    #[must_use]
    pub fn with_summarization_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summarization_prompt = Some(prompt.into());
        self
    }

    /// Checks all required fields are present. Performed once, before the
    /// pipeline touches the network.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.source_id.trim().is_empty() {
            return Err(SyncError::configuration("source_id must not be empty"));
        }
        if self.collection_name.trim().is_empty() {
            return Err(SyncError::configuration("collection_name must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(SyncError::configuration("namespace must not be empty"));
        }
        if let Some(prompt) = &self.summarization_prompt {
            if !prompt.contains("{text}") {
                return Err(SyncError::configuration(
                    "summarization_prompt must contain a {text} placeholder",
                ));
            }
        }
        Ok(())
    }
}

/// Rejects empty credential strings at collaborator construction time.
pub(crate) fn require_credential(value: &str, name: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::Configuration(format!("{name} must not be empty")));
    }
    Ok(())
}
