//! Formatting strategies turning raw source content into chunkable text.
//!
//! Both document kinds share one `format` capability; the kind selects the
//! strategy. Pages are free text that needs markup stripped, collection
//! records are property maps rendered into `key: value` lines.

use regex::Regex;
use serde_json::Value;

use crate::document::{DocumentContent, SourceDocument, SourceKind};
use crate::types::SyncError;

/// Compiled cleanup patterns, built once per chunker.
#[derive(Debug)]
pub struct DocumentFormatter {
    collapsible_tags: Regex,
    residual_tags: Regex,
    excess_newlines: Regex,
    unsupported_notice: Regex,
    asterisks: Regex,
    quoted_bracket: Regex,
    brackets: Regex,
    whitespace_runs: Regex,
}

impl DocumentFormatter {
    pub fn new() -> Result<Self, SyncError> {
        let build = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| SyncError::extraction(format!("invalid formatter pattern: {err}")))
        };
        Ok(Self {
            collapsible_tags: build(r"</?(?:details|summary)[^>]*>")?,
            residual_tags: build(r"<[^>]+>")?,
            excess_newlines: build(r"\n{3,}")?,
            unsupported_notice: build(r"(?m)Unsupported type:.*$")?,
            asterisks: build(r"\*")?,
            quoted_bracket: build(r#"\["([^"]+)"\]"#)?,
            brackets: build(r"[\[\]]")?,
            whitespace_runs: build(r"\s+")?,
        })
    }

    /// Renders a document's content into the text the chunker splits,
    /// selecting the strategy by kind.
    pub fn format(&self, document: &SourceDocument) -> String {
        match document.kind {
            SourceKind::Page => self.format_page(&document.content),
            SourceKind::CollectionRecord => self.format_record(&document.content),
        }
    }

    fn format_page(&self, content: &DocumentContent) -> String {
        let raw = match content {
            DocumentContent::Text(text) => text.clone(),
            // A page delivered as properties still renders as lines first.
            DocumentContent::Properties(_) => self.format_record(content),
        };
        let text = self.collapsible_tags.replace_all(&raw, "");
        let text = self.residual_tags.replace_all(&text, "");
        let text = self.unsupported_notice.replace_all(&text, "");
        let text = text.replace("\\n", "\n").replace("\\t", " ");
        let text = self.excess_newlines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    fn format_record(&self, content: &DocumentContent) -> String {
        let properties = match content {
            DocumentContent::Properties(map) => map,
            DocumentContent::Text(text) => return self.clean_fragment(text),
        };
        properties
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| {
                let key = self.asterisks.replace_all(key, "");
                let value = self.clean_fragment(&render_value(value));
                format!("{key}: {value}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cleanup applied to property values: strip markup noise and collapse
    /// whitespace so each property renders as a single line.
    fn clean_fragment(&self, text: &str) -> String {
        let text = self.asterisks.replace_all(text, "");
        let text = self.quoted_bracket.replace_all(&text, "$1");
        let text = self.brackets.replace_all(&text, "");
        let text = self.whitespace_runs.replace_all(&text, " ");
        text.trim().to_string()
    }
}

/// Stringifies a property value; array elements are space-joined.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
