//! Paginated fetch of source documents with streaming progress.
//!
//! Callers see a flat, ordered document sequence; pagination and
//! nested-content traversal stay internal. Fetches are not retried here; a
//! transient failure aborts the load and surfaces to the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::require_credential;
use crate::document::{DocumentContent, SourceDocument, SourceKind};
use crate::progress::{ProgressSender, SyncEvent};
use crate::types::SyncError;

/// API version pinned on every request to the content source.
const API_VERSION: &str = "2022-06-28";
/// Page size used for cursor pagination.
const PAGE_SIZE: usize = 100;
/// Maximum simultaneous in-flight requests toward the content source.
const MAX_IN_FLIGHT: usize = 8;

/// Produces the flat document sequence for one source id.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Loads all documents under `source_id`, emitting
    /// [`SyncEvent::DocumentLoaded`] once per document as it becomes
    /// available.
    async fn load(
        &self,
        source_id: &str,
        kind: SourceKind,
        progress: &ProgressSender,
    ) -> Result<Vec<SourceDocument>, SyncError>;
}

/// HTTP client for the content-source API.
pub struct HttpSourceLoader {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpSourceLoader {
    pub fn new(base_url: Url, token: impl Into<String>) -> Result<Self, SyncError> {
        let token = token.into();
        require_credential(&token, "content source token")?;
        let client = Client::builder()
            .user_agent(concat!("vecsync/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| SyncError::extraction(format!("client build failed: {err}")))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|err| SyncError::extraction(format!("invalid endpoint '{path}': {err}")))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, SyncError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("X-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|err| SyncError::extraction(format!("source fetch failed: {err}")))?;
        check_status(response).await
    }

    async fn post_json<B: Serialize>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, SyncError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("X-Api-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|err| SyncError::extraction(format!("source fetch failed: {err}")))?;
        check_status(response).await
    }

    /// Collection kind: cursor-paginated query, one document per record.
    async fn load_collection(
        &self,
        source_id: &str,
        progress: &ProgressSender,
    ) -> Result<Vec<SourceDocument>, SyncError> {
        let endpoint = self.endpoint(&format!("v1/collections/{source_id}/query"))?;
        let mut documents = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = QueryRequest {
                page_size: PAGE_SIZE,
                cursor: cursor.clone(),
            };
            let page: QueryResponse = self
                .post_json(endpoint.clone(), &body)
                .await?
                .json()
                .await
                .map_err(|err| SyncError::extraction(format!("malformed query response: {err}")))?;

            for record in page.results {
                let document = SourceDocument {
                    id: record.id,
                    kind: SourceKind::CollectionRecord,
                    last_modified: record.last_modified,
                    title: record.title.clone(),
                    content: DocumentContent::Properties(record.properties),
                    url: record.url,
                };
                progress.emit(SyncEvent::DocumentLoaded {
                    current: documents.len() + 1,
                    total: page.total,
                    title: record.title,
                });
                documents.push(document);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(documents)
    }

    /// Page kind: one document assembled from the page's block tree. Blocks
    /// with children are expanded with bounded concurrency, order preserved.
    async fn load_page(
        &self,
        source_id: &str,
        progress: &ProgressSender,
    ) -> Result<Vec<SourceDocument>, SyncError> {
        let meta: PagePayload = self
            .get(self.endpoint(&format!("v1/pages/{source_id}"))?)
            .await?
            .json()
            .await
            .map_err(|err| SyncError::extraction(format!("malformed page response: {err}")))?;

        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut endpoint = self.endpoint(&format!("v1/pages/{source_id}/blocks"))?;
            {
                let mut query = endpoint.query_pairs_mut();
                query.append_pair("page_size", &PAGE_SIZE.to_string());
                if let Some(cursor) = &cursor {
                    query.append_pair("cursor", cursor);
                }
            }
            let page: BlocksResponse = self
                .get(endpoint)
                .await?
                .json()
                .await
                .map_err(|err| SyncError::extraction(format!("malformed blocks response: {err}")))?;
            blocks.extend(page.blocks);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(page = source_id, blocks = blocks.len(), "fetched block tree");

        let expanded: Vec<String> = stream::iter(blocks.into_iter().map(|block| async move {
            if block.has_children {
                self.fetch_block_children(block).await
            } else {
                Ok(block.text)
            }
        }))
        .buffered(MAX_IN_FLIGHT)
        .try_collect()
        .await?;

        let text = expanded
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        progress.emit(SyncEvent::DocumentLoaded {
            current: 1,
            total: 1,
            title: meta.title.clone(),
        });
        Ok(vec![SourceDocument {
            id: meta.id,
            kind: SourceKind::Page,
            last_modified: meta.last_modified,
            title: meta.title,
            content: DocumentContent::Text(text),
            url: meta.url,
        }])
    }

    async fn fetch_block_children(&self, block: BlockPayload) -> Result<String, SyncError> {
        let children: BlocksResponse = self
            .get(self.endpoint(&format!("v1/blocks/{}/children", block.id))?)
            .await?
            .json()
            .await
            .map_err(|err| SyncError::extraction(format!("malformed children response: {err}")))?;
        let mut segments = vec![block.text];
        segments.extend(children.blocks.into_iter().map(|child| child.text));
        Ok(segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl SourceLoader for HttpSourceLoader {
    async fn load(
        &self,
        source_id: &str,
        kind: SourceKind,
        progress: &ProgressSender,
    ) -> Result<Vec<SourceDocument>, SyncError> {
        info!(source_id, %kind, "loading source documents");
        let documents = match kind {
            SourceKind::Page => self.load_page(source_id, progress).await?,
            SourceKind::CollectionRecord => self.load_collection(source_id, progress).await?,
        };
        info!(source_id, count = documents.len(), "source load complete");
        Ok(documents)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::extraction(format!(
        "source returned {status}: {body}"
    )))
}

#[derive(Serialize)]
struct QueryRequest {
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<RecordPayload>,
    next_cursor: Option<String>,
    total: usize,
}

#[derive(Deserialize)]
struct RecordPayload {
    id: String,
    title: String,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    url: Option<String>,
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct PagePayload {
    id: String,
    title: String,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct BlocksResponse {
    blocks: Vec<BlockPayload>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct BlockPayload {
    id: String,
    text: String,
    #[serde(default)]
    has_children: bool,
}
