//! Structured progress events for a pipeline run.
//!
//! Stages write events into a channel instead of taking ad hoc callbacks;
//! the caller drains the receiver and decides how to render them. Console
//! formatting lives entirely outside the core.

use serde::{Deserialize, Serialize};

use crate::pipeline::{SyncStage, SyncStats};

/// One progress event emitted during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// The orchestrator entered a new stage.
    StageStarted { stage: SyncStage },
    /// A document became available from the source loader.
    DocumentLoaded {
        current: usize,
        total: usize,
        title: String,
    },
    /// A document's cache lookup resolved.
    DocumentResolved {
        id: String,
        cached: bool,
        chunks: usize,
    },
    /// An embedding batch finished; `processed` is cumulative.
    ChunksEmbedded { processed: usize, total: usize },
    /// An upsert batch finished; `processed` is cumulative.
    RecordsIndexed { processed: usize, total: usize },
    /// The run reached `Done`.
    Completed { stats: SyncStats },
    /// The run reached `Failed`.
    Failed { code: String, message: String },
}

/// Cloneable sending half handed to each stage.
///
/// Emission is non-blocking and infallible from the stages' point of view: a
/// dropped receiver means the caller stopped listening, which never fails
/// the run.
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: Option<flume::Sender<SyncEvent>>,
}

impl ProgressSender {
    /// Creates a connected channel; drain the receiver to observe the run.
    pub fn channel() -> (Self, flume::Receiver<SyncEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops every event, for callers that don't care.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
