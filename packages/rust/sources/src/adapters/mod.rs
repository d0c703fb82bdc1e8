//! The six source adapters, modelled as one enum over variant structs.
//!
//! Each variant carries only the capability handle and budget its own call
//! needs. `execute` returns zero or more candidates; an empty list means the
//! input was read but held no product.

mod document;
mod free_text;
mod identifier;
mod image;
mod page;
mod tabular;

use std::future::Future;
use std::time::Duration;

use tracing::instrument;

use copyforge_shared::{
    CapabilityError, Category, CopyforgeError, PipelineSettings, RawCandidate, Result, SourceKind,
};

pub use document::DocumentAdapter;
pub use free_text::FreeTextAdapter;
pub use identifier::IdentifierAdapter;
pub use image::ImageAdapter;
pub use page::PageAdapter;
pub use tabular::TabularAdapter;

use crate::{Capabilities, SourceInput};

/// One adapter per input modality.
pub enum SourceAdapter {
    Document(DocumentAdapter),
    Image(ImageAdapter),
    Tabular(TabularAdapter),
    Identifier(IdentifierAdapter),
    Page(PageAdapter),
    FreeText(FreeTextAdapter),
}

impl SourceAdapter {
    /// Pick the adapter for an input kind, wiring in the capability it uses.
    pub fn select(kind: SourceKind, caps: &Capabilities, settings: &PipelineSettings) -> Self {
        let budgets = &caps.budgets;
        match kind {
            SourceKind::DocumentAnalysis => Self::Document(DocumentAdapter::new(
                caps.document_analysis.clone(),
                budgets.document_analysis,
            )),
            SourceKind::ImageOcr => Self::Image(ImageAdapter::new(caps.ocr.clone(), budgets.ocr)),
            SourceKind::TabularFile => Self::Tabular(TabularAdapter),
            SourceKind::IdentifierLookup => Self::Identifier(IdentifierAdapter::new(
                caps.search.clone(),
                budgets.search,
            )),
            SourceKind::PageScrape => {
                Self::Page(PageAdapter::new(caps.fetcher.clone(), budgets.fetch))
            }
            SourceKind::FreeText => Self::FreeText(FreeTextAdapter::new(
                caps.language_model.clone(),
                budgets.generation,
                settings.max_text_chars,
            )),
        }
    }

    /// Adapter tag for tracing and progress.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Document(_) => SourceKind::DocumentAnalysis,
            Self::Image(_) => SourceKind::ImageOcr,
            Self::Tabular(_) => SourceKind::TabularFile,
            Self::Identifier(_) => SourceKind::IdentifierLookup,
            Self::Page(_) => SourceKind::PageScrape,
            Self::FreeText(_) => SourceKind::FreeText,
        }
    }

    /// Convert one input into candidates.
    #[instrument(skip_all, fields(adapter = self.name(), category = %category))]
    pub async fn execute(
        &self,
        input: SourceInput,
        category: Category,
    ) -> Result<Vec<RawCandidate>> {
        match (self, input) {
            (Self::Document(a), SourceInput::Document {
                bytes, mime_type, ..
            }) => a.execute(&bytes, &mime_type).await,
            (Self::Image(a), SourceInput::Image { bytes, file_name, notes }) => {
                a.execute(&bytes, file_name.as_deref(), notes.as_deref()).await
            }
            (Self::Tabular(a), SourceInput::Tabular { bytes, .. }) => a.execute(&bytes),
            (Self::Identifier(a), SourceInput::Identifier { query }) => a.execute(&query).await,
            (Self::Page(a), SourceInput::Page { url }) => a.execute(&url).await,
            (Self::FreeText(a), SourceInput::FreeText { text }) => {
                a.execute(&text, category).await
            }
            (adapter, input) => Err(CopyforgeError::input(format!(
                "{} adapter cannot read {} input",
                adapter.name(),
                input.kind()
            ))),
        }
    }
}

/// Run one capability call under its timeout budget.
pub(crate) async fn bounded<T, F>(operation: &str, budget: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, CapabilityError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CopyforgeError::from_capability(operation, e)),
        Err(_) => Err(CopyforgeError::timeout(operation, budget.as_secs())),
    }
}

// ---------------------------------------------------------------------------
// Column headers
// ---------------------------------------------------------------------------

/// Header aliases for tabular sources, in match priority order.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    (
        "sku",
        &["sku", "code", "product code", "item code", "article number", "ref"],
    ),
    ("barcode", &["barcode", "ean", "ean13", "upc", "gtin"]),
    (
        "short_description",
        &["short description", "short desc", "summary"],
    ),
    (
        "long_description",
        &["long description", "long desc", "full description", "details"],
    ),
    (
        "meta_description",
        &["meta description", "meta desc", "seo description"],
    ),
    ("brand", &["brand", "manufacturer", "make"]),
    (
        "name",
        &["name", "product name", "title", "product", "item name", "description"],
    ),
    ("weight", &["weight", "weight (g)", "weight (kg)"]),
    ("price", &["price", "rrp", "cost"]),
    ("image", &["image", "image url", "picture"]),
];

/// Map a column header to its canonical field key.
///
/// Exact (case-insensitive) matches win; otherwise the first alias contained
/// in the header. Unknown headers come back lower-cased.
pub(crate) fn canonical_header(header: &str) -> String {
    let h = header.trim().trim_start_matches('\u{feff}').to_lowercase();

    for (key, aliases) in COLUMN_ALIASES {
        if aliases.contains(&h.as_str()) {
            return (*key).to_string();
        }
    }
    for (key, aliases) in COLUMN_ALIASES {
        if aliases.iter().any(|a| a.len() > 3 && h.contains(a)) {
            return (*key).to_string();
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_exact_then_partial() {
        assert_eq!(canonical_header("Product Code"), "sku");
        assert_eq!(canonical_header("EAN"), "barcode");
        assert_eq!(canonical_header("Short Description"), "short_description");
        assert_eq!(canonical_header("Description"), "name");
        assert_eq!(canonical_header("Product Name (EN)"), "name");
        assert_eq!(canonical_header("Supplier Barcode"), "barcode");
        assert_eq!(canonical_header("Material"), "material");
    }

    #[test]
    fn short_aliases_do_not_match_partially() {
        // "ref" and "ean" are too short to match inside other words
        assert_eq!(canonical_header("Preferred colour"), "preferred colour");
        assert_eq!(canonical_header("Clean instructions"), "clean instructions");
    }

    #[tokio::test]
    async fn mismatched_input_is_rejected() {
        let adapter = SourceAdapter::Tabular(TabularAdapter);
        let err = adapter
            .execute(
                SourceInput::FreeText {
                    text: "Saucepan".into(),
                },
                Category::BakewareCookware,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CopyforgeError::Input { .. }));
    }

    #[tokio::test]
    async fn bounded_maps_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, CapabilityError>(())
        };
        let err = bounded("ocr", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyforgeError::Timeout { .. }));
    }
}
