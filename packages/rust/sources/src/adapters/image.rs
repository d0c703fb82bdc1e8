//! Product photos via OCR.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, instrument};

use copyforge_shared::{ConfidenceTier, CopyforgeError, OcrEngine, RawCandidate, Result, SourceKind};

use super::bounded;
use crate::extract::{find_barcode, find_brand, find_sku, specs_from_text};

const METHOD: &str = "ocr-text";
/// Fewer visible characters than this means the photo held no usable text.
const MIN_VISIBLE_CHARS: usize = 10;
const MAX_NAME_CHARS: usize = 100;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

pub struct ImageAdapter {
    ocr: Option<Arc<dyn OcrEngine>>,
    budget: Duration,
}

impl ImageAdapter {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, budget: Duration) -> Self {
        Self { ocr, budget }
    }

    #[instrument(skip_all, fields(bytes = bytes.len(), file_name = ?file_name))]
    pub async fn execute(
        &self,
        bytes: &[u8],
        file_name: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Vec<RawCandidate>> {
        if !is_supported_image(bytes, file_name) {
            return Err(CopyforgeError::unsupported(
                "image format not recognised; expected JPEG, PNG, BMP, TIFF or WebP",
            ));
        }

        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| CopyforgeError::upstream("OCR service is not configured"))?;
        let output = bounded("ocr", self.budget, ocr.recognize(bytes)).await?;

        let visible = output.text.chars().filter(|c| !c.is_whitespace()).count();
        if visible < MIN_VISIBLE_CHARS {
            info!(visible, "no readable text in image");
            return Ok(Vec::new());
        }

        let mut text = output.text.trim().to_string();
        if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            text.push('\n');
            text.push_str(notes);
        }

        Ok(vec![candidate_from_text(&text, output.tier)])
    }
}

/// Magic bytes first, then the file extension.
fn is_supported_image(bytes: &[u8], file_name: Option<&str>) -> bool {
    let magic = bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"\x89PNG")
        || bytes.starts_with(b"BM")
        || bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP");
    if magic {
        return true;
    }
    file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_label_line(line: &str) -> bool {
    static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:sku|ean|gtin|upc|barcode|code|model|item|ref)\b").expect("valid regex")
    });
    LABEL_RE.is_match(line)
}

pub(crate) fn candidate_from_text(text: &str, tier: ConfidenceTier) -> RawCandidate {
    let mut cand = RawCandidate::new(SourceKind::ImageOcr, METHOD, tier.score());

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let name = lines
        .iter()
        .find(|l| l.chars().count() > 10 && !is_label_line(l))
        .or_else(|| lines.first())
        .map(|l| l.chars().take(MAX_NAME_CHARS).collect::<String>());
    if let Some(name) = name {
        cand.set_field("name", name);
    }
    if let Some(sku) = find_sku(text) {
        cand.set_field("sku", sku);
    }
    if let Some(barcode) = find_barcode(text) {
        cand.set_field("barcode", barcode);
    }
    if let Some(brand) = find_brand(text) {
        cand.set_field("brand", brand);
    }
    cand.specifications = specs_from_text(text);
    cand.raw_text = Some(text.to_string());
    cand
}
