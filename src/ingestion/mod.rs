//! Source loading, fingerprint caching, and optional summarization.

pub mod cache;
pub mod loader;
pub mod summarize;

pub use cache::{DEFAULT_TTL, FingerprintCache, InMemoryFingerprintCache, RedisFingerprintCache};
pub use loader::{HttpSourceLoader, SourceLoader};
pub use summarize::{DEFAULT_SUMMARY_PROMPT, HttpSummarizer, Summarizer};
