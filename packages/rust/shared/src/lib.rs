//! Shared types, error model, capability contracts and configuration for Copyforge.
//!
//! This crate is the foundation depended on by all other Copyforge crates.
//! It provides:
//! - [`CopyforgeError`]: the unified error type
//! - Domain types ([`Product`], [`RawCandidate`], [`Category`], [`Descriptions`])
//! - Boundary capability traits ([`DocumentAnalysis`], [`OcrEngine`], [`PageFetcher`],
//!   [`SearchIndex`], [`LanguageModel`])
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)

pub mod capabilities;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capabilities::{
    CapabilityError, ConfidenceTier, DocumentAnalysis, DocumentBlock, LanguageModel,
    ListingRecord, OcrEngine, OcrOutput, PageFetcher, Prompt, SearchIndex, parse_json_reply,
};
pub use config::{
    AppConfig, FetchConfig, GenerationConfig, PipelineConfig, PipelineSettings, ServiceEndpoint,
    ServicesConfig, TabularCopy, VoiceConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_api_key,
};
pub use error::{CopyforgeError, Result, SourceErrorKind};
pub use types::{
    Category, CopyOrigin, Descriptions, Product, ProductId, RawCandidate, SourceKind, SpecValue,
};
