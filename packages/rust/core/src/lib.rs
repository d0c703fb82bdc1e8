//! Core domain logic for Copyforge.
//!
//! Raw candidates from the source adapters are normalized into products,
//! given description copy (language model or template), checked against the
//! brand voice rules and repaired when they fail. [`Session`] ties the steps
//! together and owns the catalog.

pub mod fallback;
pub mod generation;
pub mod normalize;
pub mod openai;
pub mod pipeline;
pub mod single_flight;
pub mod validation;
pub mod voice;

pub use generation::{ContentGenerator, GeneratedCopy, GenerationSettings, SeoKeywords};
pub use normalize::Normalizer;
pub use openai::OpenAiCompatibleModel;
pub use pipeline::{ProductEdit, ProgressReporter, Session, SilentProgress, Submission};
pub use validation::{Check, CopyField, ValidationResult, Validator, Violation};
