//! Fingerprint-keyed chunk cache.
//!
//! Maps a document fingerprint to its previously computed chunk set so
//! unchanged documents skip chunking, summarization, and embedding on later
//! runs. Entries expire on a TTL independent of document change detection:
//! the fingerprint already encodes the modification time, so expiry only
//! forces recomputation of otherwise-unchanged content.
//!
//! Store failures are surfaced, never treated as a miss. The caller must be
//! able to distinguish "definitely new" from "cache unavailable" so an
//! infrastructure outage never silently degrades into a full recompute.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::chunking::Chunk;
use crate::config::require_credential;
use crate::document::Fingerprint;
use crate::types::SyncError;

/// Default entry lifetime: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "vecsync:chunks:";

/// Key/value store holding `(fingerprint) -> Chunk[]` with expiry.
#[async_trait]
pub trait FingerprintCache: Send + Sync {
    /// Returns the cached chunk sequence, or `None` on a miss. Store errors
    /// are `SyncError::Cache`, never folded into the miss case.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>, SyncError>;

    async fn set(
        &self,
        fingerprint: &Fingerprint,
        chunks: &[Chunk],
        ttl: Duration,
    ) -> Result<(), SyncError>;

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), SyncError>;
}

fn cache_key(fingerprint: &Fingerprint) -> String {
    format!("{KEY_PREFIX}{fingerprint}")
}

/// Redis-backed implementation, reachable by connection URL.
///
/// Concurrent runs may share this store; writers to different fingerprints
/// never conflict and same-fingerprint races are last-write-wins, which is
/// safe because the value is reproducible from the same input.
pub struct RedisFingerprintCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisFingerprintCache {
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        require_credential(url, "cache connection URL")?;
        let client = redis::Client::open(url)
            .map_err(|err| SyncError::cache(format!("invalid connection URL: {err}")))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|err| SyncError::cache(format!("connection failed: {err}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl FingerprintCache for RedisFingerprintCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>, SyncError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(cache_key(fingerprint))
            .query_async(&mut conn)
            .await
            .map_err(|err| SyncError::cache(format!("GET failed: {err}")))?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let chunks = serde_json::from_str(&raw)
                    .map_err(|err| SyncError::cache(format!("corrupt cache entry: {err}")))?;
                debug!(fingerprint = %fingerprint, "cache hit");
                Ok(Some(chunks))
            }
        }
    }

    async fn set(
        &self,
        fingerprint: &Fingerprint,
        chunks: &[Chunk],
        ttl: Duration,
    ) -> Result<(), SyncError> {
        let payload = serde_json::to_string(chunks)
            .map_err(|err| SyncError::cache(format!("serialize failed: {err}")))?;
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(cache_key(fingerprint))
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| SyncError::cache(format!("SET failed: {err}")))?;
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), SyncError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(cache_key(fingerprint))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| SyncError::cache(format!("DEL failed: {err}")))?;
        Ok(())
    }
}

/// In-process implementation with the same TTL semantics.
///
/// Useful for tests and for embedding the pipeline without external
/// infrastructure.
#[derive(Default)]
pub struct InMemoryFingerprintCache {
    entries: Mutex<HashMap<String, (Vec<Chunk>, Instant)>>,
}

impl InMemoryFingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl FingerprintCache for InMemoryFingerprintCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Chunk>>, SyncError> {
        let mut entries = self.entries.lock();
        let key = cache_key(fingerprint);
        match entries.get(&key) {
            Some((chunks, expires_at)) if *expires_at > Instant::now() => Ok(Some(chunks.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        fingerprint: &Fingerprint,
        chunks: &[Chunk],
        ttl: Duration,
    ) -> Result<(), SyncError> {
        self.entries
            .lock()
            .insert(cache_key(fingerprint), (chunks.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), SyncError> {
        self.entries.lock().remove(&cache_key(fingerprint));
        Ok(())
    }
}
