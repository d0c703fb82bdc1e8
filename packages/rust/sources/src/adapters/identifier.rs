//! Lookups by product code, scan code or product text against the search index.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use copyforge_shared::{CopyforgeError, ListingRecord, RawCandidate, Result, SearchIndex, SourceKind};

use super::bounded;
use crate::extract::is_scan_code;

const METHOD: &str = "search-listing";
const CONFIDENCE: f64 = 0.75;
const MAX_MATCHES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    ScanCode,
    ProductCode,
    Text,
}

fn classify(query: &str) -> QueryKind {
    if is_scan_code(query) {
        QueryKind::ScanCode
    } else if !query.contains(char::is_whitespace)
        && query.chars().any(|c| c.is_ascii_digit())
        && query.chars().any(|c| c.is_ascii_alphabetic())
    {
        QueryKind::ProductCode
    } else {
        QueryKind::Text
    }
}

pub struct IdentifierAdapter {
    index: Option<Arc<dyn SearchIndex>>,
    budget: Duration,
}

impl IdentifierAdapter {
    pub fn new(index: Option<Arc<dyn SearchIndex>>, budget: Duration) -> Self {
        Self { index, budget }
    }

    #[instrument(skip_all, fields(query = %query))]
    pub async fn execute(&self, query: &str) -> Result<Vec<RawCandidate>> {
        let query = query.trim();
        let kind = classify(query);

        let index = self
            .index
            .as_ref()
            .ok_or_else(|| CopyforgeError::upstream("search index is not configured"))?;
        let records = bounded("search", self.budget, index.search(query, MAX_MATCHES)).await?;

        let candidates: Vec<RawCandidate> = records
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .take(MAX_MATCHES)
            .map(|r| candidate_from_listing(r, query, kind))
            .collect();
        info!(?kind, matches = candidates.len(), "identifier lookup finished");
        Ok(candidates)
    }
}

fn candidate_from_listing(record: ListingRecord, query: &str, kind: QueryKind) -> RawCandidate {
    let mut cand = RawCandidate::new(SourceKind::IdentifierLookup, METHOD, CONFIDENCE);
    for (key, value) in &record.attributes {
        cand.set_field(&key.to_lowercase(), value);
    }
    cand.set_field("name", &record.title);
    if let Some(brand) = &record.brand {
        cand.set_field("brand", brand);
    }

    match (&record.sku, kind) {
        (Some(sku), _) => cand.set_field("sku", sku),
        (None, QueryKind::ProductCode) => cand.set_field("sku", query),
        _ => {}
    }
    match (&record.barcode, kind) {
        (Some(code), _) => cand.set_field("barcode", code),
        (None, QueryKind::ScanCode) => cand.set_field("barcode", query),
        _ => {}
    }

    if !record.link.trim().is_empty() {
        cand.source_url = Some(record.link);
    }
    cand.raw_text = record.snippet.filter(|s| !s.trim().is_empty());
    cand
}
