//! Optional per-chunk summarization on cache miss.
//!
//! A summarization failure fails the whole run; there is no per-document
//! skip-and-continue policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::require_credential;
use crate::types::SyncError;

/// Prompt used when the caller configures summarization without a custom
/// prompt. `{text}` is replaced with the chunk text.
pub const DEFAULT_SUMMARY_PROMPT: &str = "Write a comprehensive summary of the following content.\n\
Include all key information, people, attributes, metrics, and relationships.\n\
Your summary should be 2-3 complete sentences and must not be cut off.\n\
Content:\n{text}\nSUMMARY:";

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 500;

/// Generates a short summary for a piece of chunk text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, prompt: &str) -> Result<String, SyncError>;
}

/// Completion-endpoint client for summarization.
pub struct HttpSummarizer {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl HttpSummarizer {
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let api_key = api_key.into();
        require_credential(&api_key, "summarizer API key")?;
        let client = Client::builder()
            .user_agent(concat!("vecsync/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| SyncError::extraction(format!("client build failed: {err}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str, prompt: &str) -> Result<String, SyncError> {
        let endpoint = self
            .base_url
            .join("v1/completions")
            .map_err(|err| SyncError::extraction(format!("invalid endpoint: {err}")))?;
        let request = CompletionRequest {
            model: &self.model,
            prompt: prompt.replace("{text}", text),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| SyncError::extraction(format!("summarization call failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::extraction(format!(
                "summarizer returned {status}: {body}"
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|err| SyncError::extraction(format!("malformed completion: {err}")))?;
        let summary = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| SyncError::extraction("summarizer returned no completion"))?;
        Ok(summary)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}
