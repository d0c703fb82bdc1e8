//! Contracts for the external services the pipeline consumes.
//!
//! Each capability is a black box behind an async trait. The HTTP-backed
//! implementations live in `copyforge-sources` (document analysis, OCR,
//! web fetch, search index) and `copyforge-core` (language generation);
//! tests substitute in-process fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Failure reported by a boundary capability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Not configured, quota exhausted, or a server-side error.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unreadable: {0}")]
    Unreadable(String),

    /// Host could not be reached or answered with a non-success status.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The service answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Document analysis
// ---------------------------------------------------------------------------

/// One structural block returned by document analysis, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentBlock {
    Heading { text: String, level: u8 },
    Text { text: String },
    ListItem { text: String },
    Table { rows: Vec<Vec<String>> },
}

#[async_trait]
pub trait DocumentAnalysis: Send + Sync {
    /// Analyse a binary document of the given mime type.
    async fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DocumentBlock>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// OCR
// ---------------------------------------------------------------------------

/// Coarse confidence reported alongside recognised text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn score(&self) -> f64 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.7,
            Self::Low => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Recognised text; empty when the image holds no text.
    pub text: String,
    pub tier: ConfidenceTier,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Web fetch
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch page markup. Non-success statuses are `Unreachable`.
    async fn fetch(&self, url: &Url) -> Result<String, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

/// A listing returned by the search index, already close to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    /// Canonical product link.
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Query by code, scan code or text. No match is an empty list, not an error.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ListingRecord>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Language generation
// ---------------------------------------------------------------------------

/// A structured prompt for the language model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's free-text reply.
    async fn complete(&self, prompt: &Prompt) -> Result<String, CapabilityError>;

    /// Model identifier for tracing.
    fn name(&self) -> &str;
}

/// Pull the first JSON object out of a model reply.
///
/// Replies are often wrapped in code fences or surrounded by chatter; this
/// accepts any reply that contains one balanced `{...}` object.
pub fn parse_json_reply(reply: &str) -> Result<serde_json::Value, CapabilityError> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(value @ serde_json::Value::Object(_)) =
        serde_json::from_str::<serde_json::Value>(unfenced)
    {
        return Ok(value);
    }

    let start = unfenced
        .find('{')
        .ok_or_else(|| CapabilityError::Malformed("no JSON object in reply".into()))?;
    let end = unfenced
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| CapabilityError::Malformed("unterminated JSON object".into()))?;

    serde_json::from_str(&unfenced[start..=end])
        .map_err(|e| CapabilityError::Malformed(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_reply_plain_and_fenced() {
        let v = parse_json_reply(r#"{"short_html": "<p>a</p>"}"#).unwrap();
        assert_eq!(v["short_html"], "<p>a</p>");

        let v = parse_json_reply("```json\n{\"name\": \"Pan\"}\n```").unwrap();
        assert_eq!(v["name"], "Pan");
    }

    #[test]
    fn json_reply_with_chatter() {
        let v = parse_json_reply("Sure! Here it is: {\"name\": \"Pan\"} Hope that helps.").unwrap();
        assert_eq!(v["name"], "Pan");
    }

    #[test]
    fn json_reply_without_object_is_malformed() {
        assert!(matches!(
            parse_json_reply("I cannot help with that."),
            Err(CapabilityError::Malformed(_))
        ));
    }

    #[test]
    fn document_blocks_deserialize_tagged() {
        let json = r#"[
            {"type": "heading", "text": "Chef's Knife", "level": 2},
            {"type": "list_item", "text": "Forged steel"},
            {"type": "table", "rows": [["Weight", "200g"]]}
        ]"#;
        let blocks: Vec<DocumentBlock> = serde_json::from_str(json).expect("parse blocks");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], DocumentBlock::Heading { level: 2, .. }));
        assert!(matches!(&blocks[2], DocumentBlock::Table { rows } if rows[0][1] == "200g"));
    }

    #[test]
    fn tier_scores_are_ordered() {
        assert!(ConfidenceTier::High.score() > ConfidenceTier::Medium.score());
        assert!(ConfidenceTier::Medium.score() > ConfidenceTier::Low.score());
    }
}
