//! Supplier documents (PDF, Word, PowerPoint, HTML) via the document
//! analysis service, segmented into one candidate per heading or table row.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use copyforge_shared::{
    CopyforgeError, DocumentAnalysis, DocumentBlock, RawCandidate, Result, SourceKind,
};

use super::{bounded, canonical_header};
use crate::extract::key_value;

const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/html",
];

const METHOD: &str = "document-structure";
const TABLE_METHOD: &str = "document-table";
const CONFIDENCE: f64 = 0.8;

pub struct DocumentAdapter {
    service: Option<Arc<dyn DocumentAnalysis>>,
    budget: Duration,
}

impl DocumentAdapter {
    pub fn new(service: Option<Arc<dyn DocumentAnalysis>>, budget: Duration) -> Self {
        Self { service, budget }
    }

    #[instrument(skip_all, fields(mime_type = %mime_type, bytes = bytes.len()))]
    pub async fn execute(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<RawCandidate>> {
        let mime = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(CopyforgeError::unsupported(format!(
                "document type '{mime}' is not supported; expected PDF, DOCX, PPTX or HTML"
            )));
        }

        let service = self
            .service
            .as_ref()
            .ok_or_else(|| CopyforgeError::upstream("document analysis service is not configured"))?;

        let blocks = bounded("document analysis", self.budget, service.analyze(bytes, &mime)).await?;
        let candidates = segment_blocks(&blocks);
        info!(
            blocks = blocks.len(),
            candidates = candidates.len(),
            "document segmented"
        );
        Ok(candidates)
    }
}

fn candidate() -> RawCandidate {
    RawCandidate::new(SourceKind::DocumentAnalysis, METHOD, CONFIDENCE)
}

/// Group analysed blocks into candidates.
///
/// A heading opens a new candidate. Text lines and list items attach to the
/// open one. A table whose header names a product column yields one
/// candidate per row; any other table is read as key/value pairs.
pub(crate) fn segment_blocks(blocks: &[DocumentBlock]) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    let mut current: Option<RawCandidate> = None;

    for block in blocks {
        match block {
            DocumentBlock::Heading { text, .. } => {
                flush(&mut current, &mut out);
                current = Some(candidate().with_field("name", text));
            }
            DocumentBlock::Text { text } => {
                let cand = current.get_or_insert_with(candidate);
                for line in text.lines() {
                    absorb_line(cand, line);
                }
            }
            DocumentBlock::ListItem { text } => {
                let cand = current.get_or_insert_with(candidate);
                match key_value(text) {
                    Some((k, v)) => cand.set_field(&k.to_lowercase(), v),
                    None => {
                        let item = text.trim();
                        if !item.is_empty() {
                            cand.features.push(item.to_string());
                        }
                    }
                }
            }
            DocumentBlock::Table { rows } => match table_rows(rows) {
                Some(row_candidates) => {
                    flush(&mut current, &mut out);
                    out.extend(row_candidates);
                }
                None => {
                    let cand = current.get_or_insert_with(candidate);
                    for row in rows.iter().filter(|r| r.len() >= 2) {
                        cand.set_field(&row[0].trim().to_lowercase(), &row[1]);
                    }
                }
            },
        }
    }
    flush(&mut current, &mut out);
    out
}

fn flush(current: &mut Option<RawCandidate>, out: &mut Vec<RawCandidate>) {
    if let Some(cand) = current.take() {
        if cand.field("name").is_some() {
            out.push(cand);
        } else {
            debug!("dropping unnamed document segment");
        }
    }
}

fn absorb_line(cand: &mut RawCandidate, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if let Some((k, v)) = key_value(line) {
        cand.set_field(&k.to_lowercase(), v);
        return;
    }
    if cand.field("name").is_none() && looks_like_name(line) {
        cand.set_field("name", line);
        return;
    }
    match cand.raw_text.as_mut() {
        Some(text) => {
            text.push('\n');
            text.push_str(line);
        }
        None => cand.raw_text = Some(line.to_string()),
    }
}

fn looks_like_name(line: &str) -> bool {
    let len = line.chars().count();
    (3..=120).contains(&len) && !line.ends_with('.') && line.split_whitespace().count() <= 12
}

/// Rows of a product table, or `None` when the header has no name column.
fn table_rows(rows: &[Vec<String>]) -> Option<Vec<RawCandidate>> {
    let (header, body) = rows.split_first()?;
    let keys: Vec<String> = header.iter().map(|h| canonical_header(h)).collect();
    if !keys.iter().any(|k| k == "name") {
        return None;
    }

    let candidates = body
        .iter()
        .map(|row| {
            let mut cand = RawCandidate::new(SourceKind::DocumentAnalysis, TABLE_METHOD, CONFIDENCE);
            for (key, cell) in keys.iter().zip(row) {
                if !cand.fields.contains_key(key) {
                    cand.set_field(key, cell);
                }
            }
            cand
        })
        .filter(|c| c.field("name").is_some())
        .collect();
    Some(candidates)
}
