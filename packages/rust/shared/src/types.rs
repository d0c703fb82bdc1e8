//! Core domain types for the product catalog pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CopyforgeError, Result};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The closed set of catalog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Bakeware, Cookware")]
    BakewareCookware,
    #[serde(rename = "Dining, Drink, Living")]
    DiningDrinkLiving,
    #[serde(rename = "Electricals")]
    Electricals,
    #[serde(rename = "Food Prep & Tools")]
    FoodPrepTools,
    #[serde(rename = "Knives, Cutlery")]
    KnivesCutlery,
    #[serde(rename = "Clothing")]
    Clothing,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::BakewareCookware,
        Self::DiningDrinkLiving,
        Self::Electricals,
        Self::FoodPrepTools,
        Self::KnivesCutlery,
        Self::Clothing,
    ];

    /// Display label, as shown to users and written to exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BakewareCookware => "Bakeware, Cookware",
            Self::DiningDrinkLiving => "Dining, Drink, Living",
            Self::Electricals => "Electricals",
            Self::FoodPrepTools => "Food Prep & Tools",
            Self::KnivesCutlery => "Knives, Cutlery",
            Self::Clothing => "Clothing",
        }
    }

    /// Kebab-case slug, convenient on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::BakewareCookware => "bakeware-cookware",
            Self::DiningDrinkLiving => "dining-drink-living",
            Self::Electricals => "electricals",
            Self::FoodPrepTools => "food-prep-tools",
            Self::KnivesCutlery => "knives-cutlery",
            Self::Clothing => "clothing",
        }
    }

    /// Lifestyle vs technical share of the long description, in percent.
    pub fn copy_ratio(&self) -> (u8, u8) {
        match self {
            Self::Clothing => (100, 0),
            Self::Electricals => (0, 100),
            Self::BakewareCookware => (50, 50),
            Self::DiningDrinkLiving => (80, 20),
            Self::KnivesCutlery => (30, 70),
            Self::FoodPrepTools => (60, 40),
        }
    }

    /// Specification keys that may appear in copy for this category.
    pub fn allowed_specs(&self) -> &'static [&'static str] {
        match self {
            Self::KnivesCutlery => &[
                "material",
                "bladeLength",
                "dimensions",
                "weight",
                "origin",
                "guarantee",
                "care",
            ],
            Self::Electricals => &[
                "capacity",
                "dimensions",
                "weight",
                "powerW",
                "programs",
                "origin",
                "guarantee",
                "care",
            ],
            Self::DiningDrinkLiving | Self::BakewareCookware => &[
                "material",
                "capacity",
                "dimensions",
                "weight",
                "origin",
                "guarantee",
                "care",
            ],
            Self::FoodPrepTools => &[
                "material",
                "dimensions",
                "weight",
                "origin",
                "guarantee",
                "care",
            ],
            Self::Clothing => &["material", "dimensions", "weight", "origin", "care"],
        }
    }

    pub fn allows_spec(&self, key: &str) -> bool {
        self.allowed_specs().contains(&key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = CopyforgeError;

    /// Accepts the label (case-insensitive) or the slug.
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(needle) || c.slug() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|c| c.label()).collect();
                CopyforgeError::input(format!(
                    "unknown category '{needle}', expected one of: {}",
                    known.join(" | ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// ProductId
// ---------------------------------------------------------------------------

/// Session-unique product identifier, assigned once at normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Which adapter produced a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    DocumentAnalysis,
    ImageOcr,
    TabularFile,
    IdentifierLookup,
    PageScrape,
    FreeText,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentAnalysis => "document-analysis",
            Self::ImageOcr => "image-ocr",
            Self::TabularFile => "tabular-file",
            Self::IdentifierLookup => "identifier-lookup",
            Self::PageScrape => "page-scrape",
            Self::FreeText => "free-text",
        }
    }

    /// Short prefix used in product ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::DocumentAnalysis => "doc",
            Self::ImageOcr => "img",
            Self::TabularFile => "tab",
            Self::IdentifierLookup => "ids",
            Self::PageScrape => "web",
            Self::FreeText => "txt",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SpecValue
// ---------------------------------------------------------------------------

/// A specification value: free text, a number, or a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl SpecValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Flag(_) => None,
        }
    }
}

impl fmt::Display for SpecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("yes"),
            Self::Flag(false) => f.write_str("no"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SpecValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SpecValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for SpecValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Descriptions
// ---------------------------------------------------------------------------

/// The three marketing copy fields carried by every product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptions {
    /// One `<p>` block with `<br>` separated items.
    pub short_description: String,
    /// Ordered `<p>` blocks.
    pub long_description: String,
    /// Plain single sentence.
    pub meta_description: String,
}

impl Descriptions {
    pub fn is_empty(&self) -> bool {
        self.short_description.is_empty()
            && self.long_description.is_empty()
            && self.meta_description.is_empty()
    }
}

/// Where a product's current description copy came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyOrigin {
    /// Not generated yet.
    #[default]
    Pending,
    /// Written by the language model and passed validation.
    Generated,
    /// Built by the deterministic template.
    Fallback,
    /// Provided by the supplier file.
    Supplied,
    /// Repaired by clamping after validation kept failing.
    Clamped,
    /// Written by a user edit.
    Edited,
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// The canonical product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub sku: String,
    #[serde(default)]
    pub barcode: String,
    pub category: Option<Category>,
    pub source: SourceKind,
    #[serde(default)]
    pub specifications: BTreeMap<String, SpecValue>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub descriptions: Descriptions,
    pub confidence: f64,
    pub extraction_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Text the product was read from (OCR output, free text, page copy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_human: Option<String>,
    #[serde(default)]
    pub is_non_stick: bool,
    /// Search keywords offered to the model as hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seo_keywords: Vec<String>,
    /// Search-oriented meta sentence the model may start from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_meta_seed: Option<String>,
    #[serde(default)]
    pub copy_origin: CopyOrigin,
}

impl Product {
    /// A product with its identity set and every other field empty.
    pub fn new(id: ProductId, name: impl Into<String>, source: SourceKind) -> Self {
        Self {
            id,
            name: name.into(),
            brand: String::new(),
            sku: String::new(),
            barcode: String::new(),
            category: None,
            source,
            specifications: BTreeMap::new(),
            features: Vec::new(),
            descriptions: Descriptions::default(),
            confidence: 0.0,
            extraction_method: String::new(),
            source_url: None,
            raw_text: None,
            weight_grams: None,
            weight_human: None,
            is_non_stick: false,
            seo_keywords: Vec::new(),
            seo_meta_seed: None,
            copy_origin: CopyOrigin::Pending,
        }
    }

    /// Specifications the product's category allows in copy, in key order.
    pub fn allowed_specifications(&self) -> impl Iterator<Item = (&str, &SpecValue)> {
        self.specifications
            .iter()
            .filter(|(k, _)| self.category.is_none_or(|c| c.allows_spec(k)))
            .map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// RawCandidate
// ---------------------------------------------------------------------------

/// Adapter output before normalization.
///
/// `fields` holds free-form keyed values (column headers, page metadata,
/// labelled OCR lines); the normalizer resolves them through alias lists.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub source: SourceKind,
    pub extraction_method: String,
    pub confidence: f64,
    pub fields: BTreeMap<String, String>,
    pub specifications: BTreeMap<String, SpecValue>,
    pub features: Vec<String>,
    pub raw_text: Option<String>,
    pub source_url: Option<String>,
}

impl RawCandidate {
    pub fn new(source: SourceKind, extraction_method: impl Into<String>, confidence: f64) -> Self {
        Self {
            source,
            extraction_method: extraction_method.into(),
            confidence,
            fields: BTreeMap::new(),
            specifications: BTreeMap::new(),
            features: Vec::new(),
            raw_text: None,
            source_url: None,
        }
    }

    /// Set a free-form field. Blank values are ignored.
    pub fn with_field(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.set_field(key, value);
        self
    }

    pub fn set_field(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.fields.insert(key.to_string(), value.to_string());
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_spec(mut self, key: &str, value: impl Into<SpecValue>) -> Self {
        self.specifications.insert(key.to_string(), value.into());
        self
    }
}
