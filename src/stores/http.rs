//! REST client for the vector store's upsert endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::config::require_credential;
use crate::types::SyncError;

use super::{VectorIndex, VectorRecord};

/// HTTP vector store collaborator.
pub struct HttpVectorIndex {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpVectorIndex {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Result<Self, SyncError> {
        let api_key = api_key.into();
        require_credential(&api_key, "vector store API key")?;
        let client = Client::builder()
            .user_agent(concat!("vecsync/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| SyncError::Indexing {
                committed: 0,
                message: format!("client build failed: {err}"),
            })?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert_batch(
        &self,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), SyncError> {
        let indexing_error = |message: String| SyncError::Indexing {
            committed: 0,
            message,
        };
        let endpoint = self
            .base_url
            .join(&format!("v1/collections/{collection}/vectors/upsert"))
            .map_err(|err| indexing_error(format!("invalid endpoint: {err}")))?;

        let request = UpsertRequest {
            namespace,
            vectors: records,
        };
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| indexing_error(format!("upsert call failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(indexing_error(format!("store returned {status}: {body}")));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    namespace: &'a str,
    vectors: &'a [VectorRecord],
}
