//! Source adapters: turn one user input into raw product candidates.
//!
//! Inputs arrive as a [`SourceInput`]; [`SourceAdapter::select`] picks the
//! adapter for its kind and [`Capabilities`] supplies the external services
//! each adapter may call. HTTP implementations of those services live in
//! the `clients` module.

pub mod adapters;
mod clients;
mod extract;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use copyforge_shared::{
    AppConfig, CopyforgeError, DocumentAnalysis, LanguageModel, OcrEngine, PageFetcher,
    PipelineSettings, Result, SearchIndex, SourceKind,
};

pub use adapters::SourceAdapter;
pub use clients::{HttpDocumentAnalysis, HttpOcr, HttpPageFetcher, HttpSearchIndex};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One user submission, by modality.
#[derive(Clone, PartialEq)]
pub enum SourceInput {
    Document {
        bytes: Vec<u8>,
        mime_type: String,
        file_name: Option<String>,
    },
    Image {
        bytes: Vec<u8>,
        file_name: Option<String>,
        /// Free-text notes typed alongside the photo.
        notes: Option<String>,
    },
    Tabular {
        bytes: Vec<u8>,
        file_name: Option<String>,
    },
    Identifier {
        query: String,
    },
    Page {
        url: String,
    },
    FreeText {
        text: String,
    },
}

impl SourceInput {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Document { .. } => SourceKind::DocumentAnalysis,
            Self::Image { .. } => SourceKind::ImageOcr,
            Self::Tabular { .. } => SourceKind::TabularFile,
            Self::Identifier { .. } => SourceKind::IdentifierLookup,
            Self::Page { .. } => SourceKind::PageScrape,
            Self::FreeText { .. } => SourceKind::FreeText,
        }
    }

    /// Reject inputs that cannot be processed before any service is called.
    pub fn validate(&self, settings: &PipelineSettings) -> Result<()> {
        match self {
            Self::Document {
                bytes, mime_type, ..
            } => {
                check_bytes("document", bytes, settings.max_document_bytes)?;
                if mime_type.trim().is_empty() {
                    return Err(CopyforgeError::input("document mime type is missing"));
                }
            }
            Self::Image { bytes, .. } => {
                check_bytes("image", bytes, settings.max_image_bytes)?;
            }
            Self::Tabular { bytes, .. } => {
                if bytes.is_empty() {
                    return Err(CopyforgeError::input("tabular file is empty"));
                }
            }
            Self::Identifier { query } => {
                if query.trim().is_empty() {
                    return Err(CopyforgeError::input("identifier query is empty"));
                }
            }
            Self::Page { url } => {
                let trimmed = url.trim();
                if trimmed.is_empty() {
                    return Err(CopyforgeError::input("page URL is empty"));
                }
                let parsed = Url::parse(trimmed)
                    .map_err(|e| CopyforgeError::input(format!("invalid URL '{trimmed}': {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(CopyforgeError::input(format!(
                        "unsupported URL scheme '{}', expected http or https",
                        parsed.scheme()
                    )));
                }
            }
            Self::FreeText { text } => {
                if text.trim().is_empty() {
                    return Err(CopyforgeError::input("free text is empty"));
                }
            }
        }
        Ok(())
    }
}

fn check_bytes(what: &str, bytes: &[u8], max: usize) -> Result<()> {
    if bytes.is_empty() {
        return Err(CopyforgeError::input(format!("{what} is empty")));
    }
    if bytes.len() > max {
        return Err(CopyforgeError::input(format!(
            "{what} is {} bytes, limit is {max}",
            bytes.len()
        )));
    }
    Ok(())
}

// Byte payloads are elided from debug output.
impl fmt::Debug for SourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document {
                bytes,
                mime_type,
                file_name,
            } => f
                .debug_struct("Document")
                .field("bytes", &bytes.len())
                .field("mime_type", mime_type)
                .field("file_name", file_name)
                .finish(),
            Self::Image {
                bytes,
                file_name,
                notes,
            } => f
                .debug_struct("Image")
                .field("bytes", &bytes.len())
                .field("file_name", file_name)
                .field("notes", notes)
                .finish(),
            Self::Tabular { bytes, file_name } => f
                .debug_struct("Tabular")
                .field("bytes", &bytes.len())
                .field("file_name", file_name)
                .finish(),
            Self::Identifier { query } => f.debug_struct("Identifier").field("query", query).finish(),
            Self::Page { url } => f.debug_struct("Page").field("url", url).finish(),
            Self::FreeText { text } => f
                .debug_struct("FreeText")
                .field("chars", &text.chars().count())
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Per-capability call budgets.
#[derive(Debug, Clone)]
pub struct CallBudgets {
    pub document_analysis: Duration,
    pub ocr: Duration,
    pub fetch: Duration,
    pub search: Duration,
    pub generation: Duration,
}

impl From<&AppConfig> for CallBudgets {
    fn from(config: &AppConfig) -> Self {
        let services = &config.services;
        Self {
            document_analysis: services.document_analysis.timeout(),
            ocr: services.ocr.timeout(),
            fetch: Duration::from_secs(services.fetch.timeout_secs),
            search: services.search.timeout(),
            generation: Duration::from_secs(config.generation.timeout_secs),
        }
    }
}

impl Default for CallBudgets {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// The external services available to a session. Any may be absent; an
/// adapter whose service is missing fails with an upstream error.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub document_analysis: Option<Arc<dyn DocumentAnalysis>>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub fetcher: Option<Arc<dyn PageFetcher>>,
    pub search: Option<Arc<dyn SearchIndex>>,
    pub language_model: Option<Arc<dyn LanguageModel>>,
    pub budgets: CallBudgets,
}

impl Capabilities {
    /// Build the HTTP service clients named in `config`.
    ///
    /// The language model is attached separately with
    /// [`with_language_model`](Self::with_language_model).
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let services = &config.services;
        let document_analysis = HttpDocumentAnalysis::from_config(&services.document_analysis)?
            .map(|c| Arc::new(c) as Arc<dyn DocumentAnalysis>);
        let ocr = HttpOcr::from_config(&services.ocr)?.map(|c| Arc::new(c) as Arc<dyn OcrEngine>);
        let search = HttpSearchIndex::from_config(&services.search)?
            .map(|c| Arc::new(c) as Arc<dyn SearchIndex>);
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::from_config(&services.fetch)?);

        Ok(Self {
            document_analysis,
            ocr,
            fetcher: Some(fetcher),
            search,
            language_model: None,
            budgets: CallBudgets::from(config),
        })
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn with_budgets(mut self, budgets: CallBudgets) -> Self {
        self.budgets = budgets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            max_image_bytes: 8,
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn empty_inputs_rejected() {
        let s = settings();
        for input in [
            SourceInput::FreeText { text: "  ".into() },
            SourceInput::Identifier { query: "".into() },
            SourceInput::Tabular {
                bytes: vec![],
                file_name: None,
            },
            SourceInput::Image {
                bytes: vec![],
                file_name: None,
                notes: None,
            },
        ] {
            let err = input.validate(&s).unwrap_err();
            assert!(matches!(err, CopyforgeError::Input { .. }), "{input:?}");
        }
    }

    #[test]
    fn oversize_image_rejected() {
        let input = SourceInput::Image {
            bytes: vec![0; 9],
            file_name: Some("shelf.jpg".into()),
            notes: None,
        };
        let err = input.validate(&settings()).unwrap_err();
        assert!(err.to_string().contains("limit is 8"));
    }

    #[test]
    fn page_url_must_be_http() {
        let s = settings();
        assert!(
            SourceInput::Page {
                url: "not a url".into()
            }
            .validate(&s)
            .is_err()
        );
        assert!(
            SourceInput::Page {
                url: "ftp://example.com/file".into()
            }
            .validate(&s)
            .is_err()
        );
        assert!(
            SourceInput::Page {
                url: "https://shop.example.com/p/kettle".into()
            }
            .validate(&s)
            .is_ok()
        );
    }

    #[test]
    fn debug_hides_payload() {
        let input = SourceInput::Document {
            bytes: vec![1, 2, 3],
            mime_type: "application/pdf".into(),
            file_name: None,
        };
        let shown = format!("{input:?}");
        assert!(shown.contains("bytes: 3"));
    }

    #[test]
    fn capabilities_from_default_config_has_fetcher_only() {
        let caps = Capabilities::from_config(&AppConfig::default()).unwrap();
        assert!(caps.fetcher.is_some());
        assert!(caps.ocr.is_none());
        assert!(caps.search.is_none());
        assert!(caps.document_analysis.is_none());
        assert!(caps.language_model.is_none());
    }
}
