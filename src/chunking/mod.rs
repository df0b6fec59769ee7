//! Deterministic splitting of documents into overlapping text chunks.
//!
//! Splitting walks a prioritized separator list (paragraph markers first,
//! then single newlines) and merges the resulting pieces greedily up to a
//! maximum length with a fixed overlap window between consecutive chunks.
//! Length is not raw character count: URLs are collapsed to fixed-length
//! placeholders before measuring, so link density does not distort chunk
//! boundaries relative to prose density.
//!
//! Determinism is load-bearing here: chunk identifiers are derived from
//! position, not content hash, so the same input must always yield the same
//! `(chunk_index, total_chunks, text)` sequence for cache entries and
//! upserted records to line up across runs.

pub mod format;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::{SourceDocument, SourceKind, chunk_id};
use crate::types::SyncError;

pub use format::DocumentFormatter;

/// Default maximum measured length of a chunk.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 1000;
/// Default overlap window carried between consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 200;

/// A bounded-length slice of a document's formatted text plus position
/// metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub parent_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub title: String,
    pub kind: SourceKind,
    pub url: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// Optional generated summary, attached after splitting so it never
    /// influences chunk boundaries.
    pub summary: Option<String>,
}

impl Chunk {
    /// Position-derived identifier, stable across runs for unchanged input.
    pub fn id(&self) -> String {
        chunk_id(&self.parent_id, self.chunk_index)
    }
}

/// Chunker tuning knobs.
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    pub max_chunk_len: usize,
    pub overlap: usize,
    /// Separators tried in priority order; a piece still too long after the
    /// last separator is emitted oversized rather than hard-cut mid-word.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            overlap: DEFAULT_OVERLAP,
            separators: vec!["\n---\n".into(), "\n\n".into(), "\n".into()],
        }
    }
}

/// Pure splitter: document in, ordered chunk sequence out.
#[derive(Debug)]
pub struct TextChunker {
    config: ChunkerConfig,
    formatter: DocumentFormatter,
    plain_urls: Regex,
    presigned_query: Regex,
}

impl TextChunker {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_config(ChunkerConfig::default())
    }

    pub fn with_config(config: ChunkerConfig) -> Result<Self, SyncError> {
        if config.max_chunk_len == 0 {
            return Err(SyncError::configuration("max_chunk_len must be positive"));
        }
        if config.overlap >= config.max_chunk_len {
            return Err(SyncError::configuration(
                "chunk overlap must be smaller than max_chunk_len",
            ));
        }
        if config.separators.is_empty() {
            return Err(SyncError::configuration(
                "chunker needs at least one separator",
            ));
        }
        let pattern = |p: &str| {
            Regex::new(p)
                .map_err(|err| SyncError::extraction(format!("invalid length pattern: {err}")))
        };
        Ok(Self {
            config,
            formatter: DocumentFormatter::new()?,
            plain_urls: pattern(r"https?://\S+")?,
            presigned_query: pattern(r"\?X-Amz\S+")?,
        })
    }

    /// Splits a document into its ordered chunk sequence.
    ///
    /// An empty document (after formatting) yields zero chunks.
    pub fn split(&self, document: &SourceDocument) -> Result<Vec<Chunk>, SyncError> {
        let text = self.formatter.format(document);
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let pieces = self.split_recursive(&text, &self.config.separators);
        let total_chunks = pieces.len();
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                parent_id: document.id.clone(),
                chunk_index,
                total_chunks,
                text,
                title: document.title.clone(),
                kind: document.kind,
                url: document.url.clone(),
                last_modified: document.last_modified,
                summary: None,
            })
            .collect())
    }

    /// Measured length with URLs collapsed to fixed-width placeholders.
    pub fn measured_len(&self, text: &str) -> usize {
        let text = self.plain_urls.replace_all(text, "URL");
        let text = self.presigned_query.replace_all(&text, "S3URL");
        text.chars().count()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some((index, separator)) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| text.contains(sep.as_str()))
        else {
            return self.merge(vec![text.to_string()]);
        };
        let remaining = &separators[index + 1..];

        let mut finals = Vec::new();
        let mut mergeable = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if self.measured_len(&piece) < self.config.max_chunk_len {
                mergeable.push(piece);
            } else {
                if !mergeable.is_empty() {
                    finals.extend(self.merge(std::mem::take(&mut mergeable)));
                }
                if remaining.is_empty() {
                    // No finer separator left; keep the oversized piece whole.
                    let piece = piece.trim();
                    if !piece.is_empty() {
                        finals.push(piece.to_string());
                    }
                } else {
                    finals.extend(self.split_recursive(&piece, remaining));
                }
            }
        }
        if !mergeable.is_empty() {
            finals.extend(self.merge(mergeable));
        }
        finals
    }

    /// Greedy merge of split pieces into chunks, carrying a trailing window
    /// of at most `overlap` measured units into the next chunk.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let piece_len = self.measured_len(&piece);
            if window_len + piece_len > self.config.max_chunk_len && !window.is_empty() {
                push_window(&window, &mut chunks);
                while window_len > self.config.overlap
                    || (window_len + piece_len > self.config.max_chunk_len && window_len > 0)
                {
                    match window.pop_front() {
                        Some((_, front_len)) => window_len -= front_len,
                        None => break,
                    }
                }
            }
            window_len += piece_len;
            window.push_back((piece, piece_len));
        }
        push_window(&window, &mut chunks);
        chunks
    }
}

/// Splits on `separator`, keeping it glued to the front of the piece that
/// follows so rejoining the window reproduces the original spacing.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    for (i, part) in text.split(separator).enumerate() {
        if i == 0 {
            if !part.is_empty() {
                pieces.push(part.to_string());
            }
        } else {
            pieces.push(format!("{separator}{part}"));
        }
    }
    pieces
}

fn push_window(window: &VecDeque<(String, usize)>, chunks: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| piece.as_str()).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
